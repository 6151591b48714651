//! The core character-based lexer.

use std::str::Chars;

use syntax::SyntaxKind;
use unicode_categories::UnicodeCategories;

use crate::lexed::Lexed;

const EOF_CHAR: char = '\0';

pub(crate) struct Lexer<'s> {
    source: &'s str,
    chars: Chars<'s>,
    lexed: Lexed<'s>,
}

impl<'s> Lexer<'s> {
    pub(crate) fn new(source: &'s str) -> Lexer<'s> {
        let chars = source.chars();
        let lexed = Lexed::new(source);
        Lexer { source, chars, lexed }
    }

    pub(crate) fn finish(mut self) -> Lexed<'s> {
        let offset = self.consumed();
        self.lexed.push(SyntaxKind::END_OF_FILE, offset, None);
        self.lexed
    }

    pub(crate) fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    fn consumed(&self) -> usize {
        self.source.len() - self.chars.as_str().len()
    }

    fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    fn second(&self) -> char {
        let mut chars = self.chars.clone();
        chars.next();
        chars.next().unwrap_or(EOF_CHAR)
    }

    fn take(&mut self) -> char {
        self.chars.next().unwrap_or(EOF_CHAR)
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) {
        while !self.is_eof() && predicate(self.first()) {
            self.take();
        }
    }

    /// Consumes a line end if one starts at the cursor.
    fn take_line_end(&mut self) -> bool {
        match (self.first(), self.second()) {
            ('\n', _) => {
                self.take();
                true
            }
            ('\r', '\n') => {
                self.take();
                self.take();
                true
            }
            _ => false,
        }
    }
}

impl Lexer<'_> {
    pub(crate) fn take_token(&mut self) {
        match self.first() {
            '\n' => self.take_newline_or_break(),
            '\r' if self.second() == '\n' => self.take_newline_or_break(),
            '\r' => self.take_single(SyntaxKind::WHITESPACE),
            '%' => self.take_comment(),
            '\\' => self.take_backslash(),
            '{' => self.take_single(SyntaxKind::LEFT_CURLY),
            '}' => self.take_single(SyntaxKind::RIGHT_CURLY),
            '[' => self.take_single(SyntaxKind::LEFT_SQUARE),
            ']' => self.take_single(SyntaxKind::RIGHT_SQUARE),
            '&' => self.take_single(SyntaxKind::AMPERSAND),
            '=' => self.take_single(SyntaxKind::EQUALS),
            ',' => self.take_single(SyntaxKind::COMMA),
            '$' => self.take_dollar(),
            '#' => self.take_parameter(),
            i if is_whitespace(i) => self.take_whitespace(),
            _ => self.take_word(),
        }
    }

    fn take_single(&mut self, kind: SyntaxKind) {
        let offset = self.consumed();
        self.take();
        self.lexed.push(kind, offset, None);
    }

    fn take_whitespace(&mut self) {
        let offset = self.consumed();
        self.take_while(is_whitespace);
        self.lexed.push(SyntaxKind::WHITESPACE, offset, None);
    }

    /// A line end followed by blank lines becomes a single [`SyntaxKind::BREAK`].
    fn take_newline_or_break(&mut self) {
        let offset = self.consumed();
        self.take_line_end();

        let mut kind = SyntaxKind::NEWLINE;
        loop {
            let checkpoint = self.chars.clone();
            self.take_while(is_whitespace);
            if self.take_line_end() {
                kind = SyntaxKind::BREAK;
            } else {
                self.chars = checkpoint;
                break;
            }
        }

        self.lexed.push(kind, offset, None);
    }

    fn take_comment(&mut self) {
        let offset = self.consumed();
        self.take_while(|c| c != '\n' && c != '\r');
        self.lexed.push(SyntaxKind::COMMENT, offset, None);
    }

    fn take_backslash(&mut self) {
        let offset = self.consumed();
        let second = self.second();

        if second.is_ascii_alphabetic() {
            self.take();
            self.take_while(|c| c.is_ascii_alphabetic());
            let kind = match &self.source[offset..self.consumed()] {
                "\\begin" => SyntaxKind::BEGIN,
                "\\end" => SyntaxKind::END,
                "\\def" => SyntaxKind::DEF,
                _ => SyntaxKind::COMMAND,
            };
            self.lexed.push(kind, offset, None);
        } else if second == '\\' {
            self.take();
            self.take();
            self.lexed.push(SyntaxKind::LINE_BREAK, offset, None);
        } else if second == EOF_CHAR || second.is_whitespace() {
            self.take();
            let error = Some("Expected a command name after '\\'");
            self.lexed.push(SyntaxKind::ERROR, offset, error);
        } else {
            self.take();
            self.take();
            self.lexed.push(SyntaxKind::ESCAPE, offset, None);
        }
    }

    fn take_dollar(&mut self) {
        let offset = self.consumed();
        self.take();
        if self.first() == '$' {
            self.take();
            self.lexed.push(SyntaxKind::DOUBLE_DOLLAR, offset, None);
        } else {
            self.lexed.push(SyntaxKind::DOLLAR, offset, None);
        }
    }

    fn take_parameter(&mut self) {
        let offset = self.consumed();
        self.take();
        if self.first().is_ascii_digit() {
            self.take();
            self.lexed.push(SyntaxKind::PARAMETER, offset, None);
        } else {
            let error = Some("Expected a parameter index after '#'");
            self.lexed.push(SyntaxKind::ERROR, offset, error);
        }
    }

    fn take_word(&mut self) {
        let offset = self.consumed();
        self.take_while(|c| !is_special(c) && !is_whitespace(c));
        self.lexed.push(SyntaxKind::WORD, offset, None);
    }
}

fn is_whitespace(c: char) -> bool {
    match c {
        ' ' | '\t' => true,
        '\n' => false,
        '\u{a0}' => false,
        _ => c.is_separator_space(),
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '\n' | '\r' | '%' | '\\' | '{' | '}' | '[' | ']' | '&' | '=' | ',' | '$' | '#')
}
