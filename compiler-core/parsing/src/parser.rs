mod blocks;
mod commands;
mod inline;

use std::sync::Arc;

use drop_bomb::DropBomb;
use syntax::{SyntaxKind, TokenSet};

use crate::builder::{ErrorSpan, Output};
use crate::ParseErrorKind;

/// Tokens that end a paragraph, and any delimited construct inside one.
pub(crate) const BLOCK_END: TokenSet = TokenSet::new(&[
    SyntaxKind::BREAK,
    SyntaxKind::DOUBLE_DOLLAR,
    SyntaxKind::BEGIN,
    SyntaxKind::END,
    SyntaxKind::END_OF_FILE,
]);

pub(crate) struct Parser<'t> {
    index: usize,
    tokens: &'t [SyntaxKind],
    output: Vec<Output>,
}

impl<'t> Parser<'t> {
    pub(crate) fn new(tokens: &'t [SyntaxKind]) -> Parser<'t> {
        let index = 0;
        let output = vec![];
        Parser { index, tokens, output }
    }

    pub(crate) fn finish(self) -> Vec<Output> {
        self.output
    }

    fn nth(&self, offset: usize) -> SyntaxKind {
        self.tokens.get(self.index + offset).copied().unwrap_or(SyntaxKind::END_OF_FILE)
    }

    fn current(&self) -> SyntaxKind {
        self.nth(0)
    }

    /// The first token at or after the cursor that is not trivia.
    fn current_non_trivia(&self) -> SyntaxKind {
        let rest = self.tokens.get(self.index..).unwrap_or_default();
        rest.iter().copied().find(|kind| !kind.is_trivia()).unwrap_or(SyntaxKind::END_OF_FILE)
    }

    fn consume(&mut self) {
        let kind = self.current();
        debug_assert_ne!(kind, SyntaxKind::END_OF_FILE, "consumed END_OF_FILE");
        self.index += 1;
        self.output.push(Output::Token { kind });
    }

    fn start(&mut self) -> NodeMarker {
        let index = self.output.len();
        self.output.push(Output::Start { kind: SyntaxKind::Node });
        NodeMarker::new(index)
    }

    /// Reports an error on the token at the cursor.
    fn error(&mut self, kind: ParseErrorKind, message: impl Into<Arc<str>>) {
        let message = message.into();
        self.output.push(Output::Error { kind, message, span: ErrorSpan::Token });
    }

    /// Reports an error spanning the node started by `marker`.
    fn error_node(&mut self, marker: &NodeMarker, kind: ParseErrorKind, message: &str) {
        let message = message.into();
        let span = ErrorSpan::Node(marker.index);
        self.output.push(Output::Error { kind, message, span });
    }

    /// Wraps the token at the cursor in an error node.
    fn error_recover(&mut self, kind: ParseErrorKind, message: impl Into<Arc<str>>) {
        let mut marker = self.start();
        self.error(kind, message);
        self.consume();
        marker.end(self, SyntaxKind::ERROR);
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.current() == kind
    }

    fn at_in(&self, set: TokenSet) -> bool {
        set.contains(self.current())
    }

    fn at_eof(&self) -> bool {
        self.at(SyntaxKind::END_OF_FILE)
    }

    fn eat(&mut self, kind: SyntaxKind) -> bool {
        if !self.at(kind) {
            return false;
        }
        self.consume();
        true
    }

    fn eat_trivia(&mut self) {
        while self.current().is_trivia() {
            self.consume();
        }
    }
}

struct NodeMarker {
    index: usize,
    bomb: DropBomb,
}

impl NodeMarker {
    fn new(index: usize) -> NodeMarker {
        let bomb = DropBomb::new("failed to call end");
        NodeMarker { index, bomb }
    }

    fn end(&mut self, parser: &mut Parser, kind: SyntaxKind) {
        self.bomb.defuse();
        match &mut parser.output[self.index] {
            Output::Start { kind: marker } => {
                *marker = kind;
            }
            _ => unreachable!(),
        }
        parser.output.push(Output::Finish);
    }
}

pub(crate) fn document(p: &mut Parser) {
    let mut m = p.start();
    blocks::blocks(p, false);
    m.end(p, SyntaxKind::Document);
}
