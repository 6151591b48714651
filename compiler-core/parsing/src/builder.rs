use std::sync::Arc;

use lexing::Lexed;
use rowan::{GreenNodeBuilder, TextRange, TextSize};
use syntax::SyntaxKind;

use crate::{ParseError, ParseErrorKind, ParsedDocument};

#[derive(Debug)]
pub(crate) enum Output {
    Start { kind: SyntaxKind },
    Token { kind: SyntaxKind },
    Error { kind: ParseErrorKind, message: Arc<str>, span: ErrorSpan },
    Finish,
}

/// Where an error points to once the tree is built.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ErrorSpan {
    /// The token following the error event.
    Token,
    /// The node whose [`Output::Start`] is at the given index.
    Node(usize),
}

struct Builder<'l, 's> {
    lexed: &'l Lexed<'s>,
    index: usize,
    builder: GreenNodeBuilder<'static>,
    stack: Vec<(usize, TextSize)>,
    ranges: Vec<Option<TextRange>>,
    pending: Vec<(ParseErrorKind, Arc<str>, usize)>,
    errors: Vec<ParseError>,
}

impl<'l, 's> Builder<'l, 's> {
    fn new(lexed: &'l Lexed<'s>, events: usize) -> Builder<'l, 's> {
        let index = 0;
        let builder = GreenNodeBuilder::new();
        let stack = vec![];
        let ranges = vec![None; events];
        let pending = vec![];
        let errors = vec![];
        Builder { lexed, index, builder, stack, ranges, pending, errors }
    }

    fn build(mut self) -> (ParsedDocument, Vec<ParseError>) {
        for (kind, message, event) in self.pending {
            let range = self.ranges[event].expect("invariant violated: unfinished error node");
            self.errors.push(ParseError { kind, range, message });
        }
        let node = self.builder.finish();
        (ParsedDocument::new(node), self.errors)
    }

    fn offset(&self) -> TextSize {
        TextSize::from(self.lexed.range(self.index).start as u32)
    }

    fn start(&mut self, event: usize, kind: SyntaxKind) {
        if kind != SyntaxKind::Node {
            self.builder.start_node(kind.into());
            self.stack.push((event, self.offset()));
        }
    }

    fn token(&mut self, kind: SyntaxKind) {
        if let Some(message) = self.lexed.error(self.index) {
            let range = self.lexed.range(self.index);
            let range = TextRange::new((range.start as u32).into(), (range.end as u32).into());
            let kind = ParseErrorKind::InvalidToken;
            self.errors.push(ParseError { kind, range, message: message.into() });
        }

        let text = self.lexed.text(self.index);
        self.builder.token(kind.into(), text);

        self.index += 1;
    }

    fn error(&mut self, kind: ParseErrorKind, message: Arc<str>, span: ErrorSpan) {
        match span {
            ErrorSpan::Token => {
                let range = self.lexed.range(self.index);
                let range = TextRange::new((range.start as u32).into(), (range.end as u32).into());
                self.errors.push(ParseError { kind, range, message });
            }
            ErrorSpan::Node(event) => {
                self.pending.push((kind, message, event));
            }
        }
    }

    fn finish(&mut self) {
        if let Some((event, start)) = self.stack.pop() {
            self.ranges[event] = Some(TextRange::new(start, self.offset()));
        }
        self.builder.finish_node();
    }
}

pub(crate) fn build(lexed: &Lexed<'_>, output: Vec<Output>) -> (ParsedDocument, Vec<ParseError>) {
    let mut builder = Builder::new(lexed, output.len());

    for (event, output) in output.into_iter().enumerate() {
        match output {
            Output::Start { kind } => builder.start(event, kind),
            Output::Token { kind } => builder.token(kind),
            Output::Error { kind, message, span } => builder.error(kind, message, span),
            Output::Finish => builder.finish(),
        }
    }

    builder.build()
}
