//! The evaluated document model.
//!
//! Nodes live in a per-block [`Arena`] and refer to their children by
//! [`DocNodeId`]. Every node carries a span relative to the start of the
//! block it was evaluated from, so that moving a block within its file
//! leaves its evaluation untouched.

use std::sync::Arc;

use building_types::{Fingerprint, NodeIdentity};
use geometry::Abs;
use la_arena::{Arena, Idx};
use rowan::TextRange;
use smol_str::SmolStr;

pub type DocNodeId = Idx<DocumentNode>;

pub type DocumentArena = Arena<DocumentNode>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentNode {
    pub kind: NodeKind,
    pub span: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Text(SmolStr),
    Space,
    LineBreak,
    InlineMath(SmolStr),
    Emphasis(Vec<DocNodeId>),
    Strong(Vec<DocNodeId>),
    Reference(SmolStr),
    Label(SmolStr),
    /// Stands in for content that could not be evaluated; the text is the
    /// source it replaces.
    Placeholder(SmolStr),

    Paragraph(Vec<DocNodeId>),
    Heading { level: u8, content: Vec<DocNodeId> },
    DisplayMath(SmolStr),
    Figure { content: Vec<DocNodeId>, caption: Option<Vec<DocNodeId>> },
    Plot(Arc<PlotSpec>),
    Image(Image),
    Table { rows: Vec<DocNodeId>, caption: Option<Vec<DocNodeId>> },
    Row(Vec<DocNodeId>),
    Cell(Vec<DocNodeId>),
    List { ordered: bool, items: Vec<DocNodeId> },
    Item(Vec<DocNodeId>),
    PageBreak,
    /// Position of a spliced document, see [`crate::EvaluatedBlock::includes`].
    Include { name: SmolStr, index: usize },
}

impl NodeKind {
    /// Block-level nodes split the paragraph they appear in.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            NodeKind::Paragraph(..)
                | NodeKind::Heading { .. }
                | NodeKind::DisplayMath(..)
                | NodeKind::Figure { .. }
                | NodeKind::Plot(..)
                | NodeKind::Image(..)
                | NodeKind::Table { .. }
                | NodeKind::List { .. }
                | NodeKind::PageBreak
                | NodeKind::Include { .. }
        )
    }

    pub fn children(&self) -> impl Iterator<Item = DocNodeId> + '_ {
        let (first, second) = match self {
            NodeKind::Emphasis(children)
            | NodeKind::Strong(children)
            | NodeKind::Paragraph(children)
            | NodeKind::Row(children)
            | NodeKind::Cell(children)
            | NodeKind::Item(children) => (children.as_slice(), None),
            NodeKind::Heading { content, .. } => (content.as_slice(), None),
            NodeKind::Figure { content, caption } => (content.as_slice(), caption.as_deref()),
            NodeKind::Table { rows, caption } => (rows.as_slice(), caption.as_deref()),
            NodeKind::List { items, .. } => (items.as_slice(), None),
            _ => (&[][..], None),
        };
        first.iter().chain(second.into_iter().flatten()).copied()
    }
}

/// An abstract plot handed to the plotting collaborator.
///
/// Two specs with the same kind, data reference and options are the same
/// plot, and share one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlotSpec {
    pub kind: SmolStr,
    pub data: SmolStr,
    pub options: Vec<(SmolStr, SmolStr)>,
    pub width: Option<Abs>,
    pub height: Option<Abs>,
}

impl PlotSpec {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Image {
    pub path: SmolStr,
    pub width: Option<Abs>,
    pub height: Option<Abs>,
}

/// Addresses a node from outside of its block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef {
    pub block: NodeIdentity,
    pub node: DocNodeId,
}

impl NodeRef {
    pub fn new(block: NodeIdentity, node: DocNodeId) -> NodeRef {
        NodeRef { block, node }
    }
}
