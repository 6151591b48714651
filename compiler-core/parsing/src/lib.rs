use std::sync::Arc;

use lexing::Lexed;
use rowan::{ast::AstNode, GreenNode, TextRange};
use syntax::{SyntaxNode, cst};

mod builder;
mod parser;
mod reparse;

pub use reparse::{reparse, try_reparse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParseErrorKind {
    UnterminatedGroup,
    UnterminatedMath,
    UnterminatedEnvironment,
    UnterminatedOptions,
    UnmatchedClose,
    UnmatchedEnd,
    MissingName,
    MissingBody,
    InvalidOption,
    InvalidToken,
}

impl ParseErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ParseErrorKind::UnterminatedGroup => "UnterminatedGroup",
            ParseErrorKind::UnterminatedMath => "UnterminatedMath",
            ParseErrorKind::UnterminatedEnvironment => "UnterminatedEnvironment",
            ParseErrorKind::UnterminatedOptions => "UnterminatedOptions",
            ParseErrorKind::UnmatchedClose => "UnmatchedClose",
            ParseErrorKind::UnmatchedEnd => "UnmatchedEnd",
            ParseErrorKind::MissingName => "MissingName",
            ParseErrorKind::MissingBody => "MissingBody",
            ParseErrorKind::InvalidOption => "InvalidOption",
            ParseErrorKind::InvalidToken => "InvalidToken",
        }
    }

    /// Unterminated constructs extend to the end of their block, so an edit
    /// that closes them can change how the following text parses.
    pub fn is_unterminated(self) -> bool {
        matches!(
            self,
            ParseErrorKind::UnterminatedGroup
                | ParseErrorKind::UnterminatedMath
                | ParseErrorKind::UnterminatedEnvironment
                | ParseErrorKind::UnterminatedOptions
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub range: TextRange,
    pub message: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedDocument {
    node: GreenNode,
}

impl ParsedDocument {
    pub(crate) fn new(node: GreenNode) -> ParsedDocument {
        ParsedDocument { node }
    }

    pub fn green(&self) -> &GreenNode {
        &self.node
    }

    pub fn syntax_node(&self) -> SyntaxNode {
        let node = self.node.clone();
        SyntaxNode::new_root(node)
    }

    pub fn cst(&self) -> cst::Document {
        let node = self.syntax_node();
        cst::Document::cast(node).expect("invariant violated: expected cst::Document")
    }
}

pub type FullParsedDocument = (ParsedDocument, Arc<[ParseError]>);

pub fn parse(lexed: &Lexed<'_>) -> FullParsedDocument {
    let (parsed, errors) = parse_events(lexed, parser::document);
    (parsed, sort_errors(errors))
}

pub fn parse_text(text: &str) -> FullParsedDocument {
    let lexed = lexing::lex(text);
    parse(&lexed)
}

fn parse_events(
    lexed: &Lexed<'_>,
    rule: fn(&mut parser::Parser),
) -> (ParsedDocument, Vec<ParseError>) {
    let mut parser = parser::Parser::new(lexed.kinds());
    rule(&mut parser);

    let output = parser.finish();
    builder::build(lexed, output)
}

fn sort_errors(mut errors: Vec<ParseError>) -> Arc<[ParseError]> {
    errors.sort_by(|a, b| {
        let a_key = (a.range.start(), a.range.end(), &a.message);
        let b_key = (b.range.start(), b.range.end(), &b.message);
        a_key.cmp(&b_key)
    });
    Arc::from(errors)
}
