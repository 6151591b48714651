//! Conversion of inline content into boxes, glue and penalties.

use evaluating::{DocNodeId, DocumentTree, EvaluatedBlock, NodeKind, NodeRef};
use geometry::Abs;
use smol_str::SmolStr;

use crate::{BoxContent, Metrics, Style};

/// Penalty at or above which a break is never taken.
pub(crate) const INFINITE_PENALTY: i64 = 10_000;
/// Penalty at or below which a break is always taken.
pub(crate) const FORCED_PENALTY: i64 = -10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Item {
    Box { width: Abs, height: Abs, node: NodeRef, content: BoxContent },
    Glue { width: Abs, stretch: Abs, shrink: Abs },
    Penalty { cost: i64 },
}

impl Item {
    pub(crate) fn width(&self) -> Abs {
        match self {
            Item::Box { width, .. } | Item::Glue { width, .. } => *width,
            Item::Penalty { .. } => Abs::ZERO,
        }
    }

    pub(crate) fn is_forced(&self) -> bool {
        matches!(self, Item::Penalty { cost } if *cost <= FORCED_PENALTY)
    }

    pub(crate) fn is_box(&self) -> bool {
        matches!(self, Item::Box { .. })
    }
}

pub(crate) struct Inline<'a> {
    tree: &'a DocumentTree,
    block: &'a EvaluatedBlock,
    metrics: &'a dyn Metrics,
    size: Abs,
    height: Abs,
    items: Vec<Item>,
}

impl<'a> Inline<'a> {
    pub(crate) fn new(
        tree: &'a DocumentTree,
        block: &'a EvaluatedBlock,
        metrics: &'a dyn Metrics,
        size: Abs,
        height: Abs,
    ) -> Inline<'a> {
        Inline { tree, block, metrics, size, height, items: vec![] }
    }

    pub(crate) fn text(&mut self, text: SmolStr, node: NodeRef, style: Style) {
        let width = self.metrics.measure(&text, self.size);
        let content = BoxContent::Text { text, size: self.size, style };
        self.items.push(Item::Box { width, height: self.height, node, content });
    }

    pub(crate) fn space(&mut self) {
        if !self.items.last().is_some_and(Item::is_box) {
            return;
        }
        let width = self.metrics.advance(' ', self.size);
        self.items.push(Item::Glue { width, stretch: width / 2, shrink: width / 3 });
    }

    pub(crate) fn nodes(&mut self, ids: &[DocNodeId], style: Style) {
        for &id in ids {
            let node = NodeRef::new(self.block.identity, id);
            match &self.block.arena[id].kind {
                NodeKind::Text(text) => self.text(text.clone(), node, style),
                NodeKind::Space => self.space(),
                NodeKind::LineBreak => self.items.push(Item::Penalty { cost: FORCED_PENALTY }),
                NodeKind::InlineMath(text) => {
                    let width = self.metrics.measure(text, self.size);
                    let content = BoxContent::Math { text: text.clone(), size: self.size, display: false };
                    self.items.push(Item::Box { width, height: self.height, node, content });
                }
                NodeKind::Emphasis(children) => self.nodes(children, Style::Emphasis),
                NodeKind::Strong(children) => self.nodes(children, Style::Strong),
                NodeKind::Reference(_) => {
                    let text = self.tree.reference(node).map(|reference| reference.text.clone());
                    self.text(text.unwrap_or_else(|| SmolStr::new_static("??")), node, style);
                }
                NodeKind::Placeholder(text) => {
                    let width = self.metrics.measure(text, self.size);
                    let content = BoxContent::Placeholder(text.clone());
                    self.items.push(Item::Box { width, height: self.height, node, content });
                }
                _ => (),
            }
        }
    }

    /// Ends the paragraph with a forced break.
    pub(crate) fn finish(mut self) -> Vec<Item> {
        while matches!(self.items.last(), Some(Item::Glue { .. })) {
            self.items.pop();
        }
        if !self.items.iter().any(Item::is_box) {
            return vec![];
        }
        if !self.items.last().is_some_and(Item::is_forced) {
            self.items.push(Item::Penalty { cost: FORCED_PENALTY });
        }
        self.items
    }
}
