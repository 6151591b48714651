use evaluating::{DocumentTree, NodeRef};
use files::FileId;
use rowan::{TextRange, TextSize};

use crate::Span;

/// Where the errors being converted come from.
///
/// Evaluation errors carry spans relative to their block; `offset` is the
/// start of that block within `file`.
pub struct DiagnosticsContext<'a> {
    pub file: FileId,
    pub content: &'a str,
    pub offset: TextSize,
    pub tree: Option<&'a DocumentTree>,
}

impl<'a> DiagnosticsContext<'a> {
    pub fn new(file: FileId, content: &'a str) -> DiagnosticsContext<'a> {
        DiagnosticsContext { file, content, offset: TextSize::new(0), tree: None }
    }

    pub fn with_offset(self, offset: TextSize) -> DiagnosticsContext<'a> {
        DiagnosticsContext { offset, ..self }
    }

    pub fn with_tree(self, tree: &'a DocumentTree) -> DiagnosticsContext<'a> {
        DiagnosticsContext { tree: Some(tree), ..self }
    }

    pub fn span_from_range(&self, range: TextRange) -> Span {
        Span::from(range + self.offset)
    }

    /// The location of an evaluated node; nodes may come from included files.
    pub fn span_from_node(&self, node: NodeRef) -> Option<(FileId, Span)> {
        let (file, range) = self.tree?.span(node)?;
        Some((file, Span::from(range)))
    }

    pub fn text_of(&self, span: Span) -> &'a str {
        self.content.get(span.start as usize..span.end as usize).unwrap_or_default()
    }
}
