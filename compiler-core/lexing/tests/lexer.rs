use std::fmt::Write;

use lexing::Lexed;

fn print_tokens(lexed: &Lexed) -> String {
    let mut buffer = String::new();
    for index in 0..lexed.len() {
        let kind = lexed.kind(index);
        let text = lexed.text(index);
        write!(buffer, "{kind:?} {text:?}").unwrap();
        if let Some(error) = lexed.error(index) {
            write!(buffer, " ! {error}").unwrap();
        }
        buffer.push('\n');
    }
    buffer
}

#[test]
fn test_paragraph_break() {
    let lexed = lexing::lex("first line\nsecond\n  \n\nthird");
    insta::assert_snapshot!(print_tokens(&lexed), @r#"
    WORD "first"
    WHITESPACE " "
    WORD "line"
    NEWLINE "\n"
    WORD "second"
    BREAK "\n  \n\n"
    WORD "third"
    "#);
}

#[test]
fn test_commands() {
    let lexed = lexing::lex(r"\section{Intro}\begin{figure}\def\end \\ \{");
    insta::assert_snapshot!(print_tokens(&lexed), @r#"
    COMMAND "\\section"
    LEFT_CURLY "{"
    WORD "Intro"
    RIGHT_CURLY "}"
    BEGIN "\\begin"
    LEFT_CURLY "{"
    WORD "figure"
    RIGHT_CURLY "}"
    DEF "\\def"
    END "\\end"
    WHITESPACE " "
    LINE_BREAK "\\\\"
    WHITESPACE " "
    ESCAPE "\\{"
    "#);
}

#[test]
fn test_math_and_parameters() {
    let lexed = lexing::lex("$x$ $$y$$ #1 #x");
    insta::assert_snapshot!(print_tokens(&lexed), @r##"
    DOLLAR "$"
    WORD "x"
    DOLLAR "$"
    WHITESPACE " "
    DOUBLE_DOLLAR "$$"
    WORD "y"
    DOUBLE_DOLLAR "$$"
    WHITESPACE " "
    PARAMETER "#1"
    WHITESPACE " "
    ERROR "#" ! Expected a parameter index after '#'
    WORD "x"
    "##);
}

#[test]
fn test_comments_and_options() {
    let lexed = lexing::lex("a % note\r\n[width=3cm, b]");
    insta::assert_snapshot!(print_tokens(&lexed), @r#"
    WORD "a"
    WHITESPACE " "
    COMMENT "% note"
    NEWLINE "\r\n"
    LEFT_SQUARE "["
    WORD "width"
    EQUALS "="
    WORD "3cm"
    COMMA ","
    WHITESPACE " "
    WORD "b"
    RIGHT_SQUARE "]"
    "#);
}

#[test]
fn test_lone_backslash() {
    let lexed = lexing::lex("a \\");
    assert_eq!(lexed.len(), 3);
    assert_eq!(lexed.error(2), Some("Expected a command name after '\\'"));
}

#[test]
fn test_lossless() {
    let source = "Some $math$ and \\emph{text}\n\n\\begin{itemize}\\item one\\end{itemize}";
    let lexed = lexing::lex(source);
    assert_eq!(lexed.text_in_range(0..lexed.len()), source);
}
