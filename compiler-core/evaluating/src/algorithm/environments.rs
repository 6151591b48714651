use std::mem;

use rowan::TextRange;
use rowan::ast::AstNode;
use smol_str::SmolStr;
use syntax::{SyntaxElement, SyntaxKind, cst};

use super::{Context, Frame, Sink, State};
use crate::{Builtin, DocNodeId, Environment, EnvironmentKind, EvaluationError, NodeKind, Value};

impl State {
    pub(super) fn environment(
        &mut self,
        ctx: &Context,
        node: cst::Environment,
        scope: &mut Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let span = self.span(ctx, frame, node.syntax().text_range());
        let begin = node.begin();
        let name = begin.as_ref().and_then(|begin| begin.name());
        let name = name.map(|name| SmolStr::from(name.plain_text())).unwrap_or_default();

        if let Some(end) = node.end() {
            if let Some(end_name) = end.name() {
                let end_name = SmolStr::from(end_name.plain_text());
                if !name.is_empty() && end_name != name {
                    let span = self.span(ctx, frame, end.syntax().text_range());
                    self.errors.push(EvaluationError::MismatchedEnvironment {
                        begin: name.clone(),
                        end: end_name,
                        span,
                    });
                }
            }
        }

        let Some(body) = node.body() else { return };
        match EnvironmentKind::from_name(&name) {
            Some(EnvironmentKind::Figure | EnvironmentKind::Plot) => {
                self.figure(ctx, &body, span, scope, frame, sink);
            }
            Some(EnvironmentKind::Table) => self.table(ctx, &body, span, scope, frame, sink),
            Some(EnvironmentKind::Itemize) => self.list(ctx, &body, span, false, scope, frame, sink),
            Some(EnvironmentKind::Enumerate) => self.list(ctx, &body, span, true, scope, frame, sink),
            None => {
                if let Some(begin) = begin.filter(|_| !name.is_empty()) {
                    let span = self.span(ctx, frame, begin.syntax().text_range());
                    self.errors.push(EvaluationError::UnknownEnvironment { name, span });
                }
                let mut local = Environment::local(scope);
                for block in body.syntax().children() {
                    self.node(ctx, block, &mut local, frame, sink);
                }
            }
        }
    }

    fn figure(
        &mut self,
        ctx: &Context,
        body: &cst::Body,
        span: TextRange,
        scope: &Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let labels = self.labels.len();
        self.captions.push(None);

        let mut local = Environment::local(scope);
        let mut inner = Sink::flow();
        for block in body.syntax().children() {
            self.node(ctx, block, &mut local, frame, &mut inner);
        }

        let caption = self.captions.pop().flatten();
        let content = inner.finish(self);
        let figure = self.alloc(NodeKind::Figure { content, caption }, span);
        for label in &mut self.labels[labels..] {
            label.figure.get_or_insert(figure);
        }
        sink.push(self, figure);
    }

    /// Cells are separated by `&` and rows by `\\` or paragraph breaks.
    fn table(
        &mut self,
        ctx: &Context,
        body: &cst::Body,
        span: TextRange,
        scope: &Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        self.captions.push(None);

        let mut local = Environment::local(scope);
        let mut table = TableBuilder::default();
        for block in body.syntax().children() {
            if block.kind() != SyntaxKind::Paragraph {
                self.node(ctx, block, &mut local, frame, &mut table.cell);
                continue;
            }
            for element in block.children_with_tokens() {
                match element.kind() {
                    SyntaxKind::AMPERSAND => table.close_cell(self, span),
                    SyntaxKind::LINE_BREAK => {
                        table.close_cell(self, span);
                        table.close_row(self, span);
                    }
                    _ => self.element(ctx, element, &mut local, frame, &mut table.cell),
                }
            }
            table.close_paragraph(self, span);
        }
        table.close_paragraph(self, span);

        let caption = self.captions.pop().flatten();
        let TableBuilder { rows, hoisted, .. } = table;
        let id = self.alloc(NodeKind::Table { rows, caption }, span);
        sink.push(self, id);
        sink.extend(self, hoisted);
    }

    /// Items start at each `\item`; content before the first one becomes
    /// an item of its own.
    #[allow(clippy::too_many_arguments)]
    fn list(
        &mut self,
        ctx: &Context,
        body: &cst::Body,
        span: TextRange,
        ordered: bool,
        scope: &Environment<'_>,
        frame: Option<&Frame<'_>>,
        sink: &mut Sink,
    ) {
        let mut local = Environment::local(scope);
        let mut items = vec![];
        let mut preamble = Sink::flow();
        let mut current: Option<(Sink, TextRange)> = None;

        for block in body.syntax().children() {
            if block.kind() != SyntaxKind::Paragraph {
                let target = current.as_mut().map_or(&mut preamble, |(content, _)| content);
                self.node(ctx, block, &mut local, frame, target);
                continue;
            }
            for element in block.children_with_tokens() {
                if is_item(&element, &local) {
                    let start = self.span(ctx, frame, element.text_range());
                    if let Some((content, start)) = current.take() {
                        items.push(self.item(content, start));
                    }
                    current = Some((Sink::flow(), start));
                    continue;
                }
                let target = current.as_mut().map_or(&mut preamble, |(content, _)| content);
                self.element(ctx, element, &mut local, frame, target);
            }
            let target = current.as_mut().map_or(&mut preamble, |(content, _)| content);
            target.flush(self);
        }

        if let Some((content, start)) = current {
            items.push(self.item(content, start));
        }

        let preamble = preamble.finish(self);
        if let Some(preamble_span) = self.cover(&preamble) {
            self.errors.push(EvaluationError::Misplaced {
                name: SmolStr::new_static("Content"),
                context: "must follow an \\item",
                span: preamble_span,
            });
            let item = self.alloc(NodeKind::Item(preamble), preamble_span);
            items.insert(0, item);
        }

        let id = self.alloc(NodeKind::List { ordered, items }, span);
        sink.push(self, id);
    }

    fn item(&mut self, content: Sink, start: TextRange) -> DocNodeId {
        let content = content.finish(self);
        let span = self.cover(&content).map_or(start, |span| start.cover(span));
        self.alloc(NodeKind::Item(content), span)
    }
}

fn is_item(element: &SyntaxElement, scope: &Environment<'_>) -> bool {
    let Some(command) = element.as_node().cloned().and_then(cst::Command::cast) else {
        return false;
    };
    let Some(name) = command.name() else { return false };
    matches!(scope.lookup(&name), Some(Value::Builtin(Builtin::Item)))
}

struct TableBuilder {
    rows: Vec<DocNodeId>,
    cells: Vec<DocNodeId>,
    cell: Sink,
    hoisted: Vec<DocNodeId>,
}

impl Default for TableBuilder {
    fn default() -> TableBuilder {
        TableBuilder { rows: vec![], cells: vec![], cell: Sink::inline(), hoisted: vec![] }
    }
}

impl TableBuilder {
    fn close_cell(&mut self, state: &mut State, fallback: TextRange) {
        let (content, blocks) = mem::replace(&mut self.cell, Sink::inline()).into_parts(state);
        self.hoisted.extend(blocks);
        let span = state.cover(&content).unwrap_or(fallback);
        let cell = state.alloc(NodeKind::Cell(content), span);
        self.cells.push(cell);
    }

    fn close_row(&mut self, state: &mut State, fallback: TextRange) {
        if self.cells.is_empty() {
            return;
        }
        let cells = mem::take(&mut self.cells);
        let span = state.cover(&cells).unwrap_or(fallback);
        let row = state.alloc(NodeKind::Row(cells), span);
        self.rows.push(row);
    }

    /// A trailing `\\` does not leave an empty row behind.
    fn close_paragraph(&mut self, state: &mut State, fallback: TextRange) {
        if !self.cell.is_empty() || !self.cells.is_empty() {
            self.close_cell(state, fallback);
        }
        self.close_row(state, fallback);
    }
}
