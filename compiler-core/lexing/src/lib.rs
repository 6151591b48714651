mod lexed;
mod lexer;

pub use lexed::Lexed;

pub fn lex(source: &str) -> Lexed<'_> {
    let mut lexer = lexer::Lexer::new(source);
    while !lexer.is_eof() {
        lexer.take_token();
    }
    lexer.finish()
}
