//! Line breaking and pagination of assembled documents.
//!
//! Each [`Segment`] of a [`DocumentTree`] is laid out on its own into a
//! [`BlockLayout`], a column of [`FlowUnit`]s with the page breaking rules
//! between them. Pagination then distributes the units over pages. Both
//! steps reuse earlier results: block layouts by key, pages by reference.

mod block;
mod breaking;
mod inline;
mod metrics;
mod paginate;

use std::sync::Arc;

pub use block::layout_segment;
pub use metrics::{Metrics, MonoMetrics};
pub use paginate::{FlowPosition, PageSpan, paginate};

use building_types::{Fingerprint, NodeIdentity};
use evaluating::{DocumentTree, NodeRef, PlotSpec, Segment};
use geometry::{Abs, PageGeometry, Rect};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Breaking {
    /// First fit, taking as much as fits on each line.
    Greedy,
    /// Total fit, minimising demerits over the whole paragraph.
    #[default]
    Optimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutConfig {
    pub geometry: PageGeometry,
    pub font_size: Abs,
    pub leading: Abs,
    pub paragraph_spacing: Abs,
    pub breaking: Breaking,
}

impl Default for LayoutConfig {
    fn default() -> LayoutConfig {
        LayoutConfig {
            geometry: PageGeometry::default(),
            font_size: Abs::pt(10),
            leading: Abs::pt(12),
            paragraph_spacing: Abs::pt(6),
            breaking: Breaking::default(),
        }
    }
}

impl LayoutConfig {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    pub fn heading_size(&self, level: u8) -> Abs {
        match level {
            1 => self.font_size.scale(7, 5),
            2 => self.font_size.scale(6, 5),
            _ => self.font_size.scale(11, 10),
        }
    }

    /// The leading for text at the given size, proportional to the body.
    pub fn leading_for(&self, size: Abs) -> Abs {
        if self.font_size.is_zero() {
            return self.leading;
        }
        self.leading.scale(size.to_raw(), self.font_size.to_raw())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    Regular,
    Emphasis,
    Strong,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoxContent {
    Text { text: SmolStr, size: Abs, style: Style },
    Math { text: SmolStr, size: Abs, display: bool },
    Placeholder(SmolStr),
    Plot(Arc<PlotSpec>),
    Image(SmolStr),
}

/// A positioned piece of content. Within a [`FlowUnit`] the rectangle is
/// relative to the top left of the unit; within a [`Page`] it is absolute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutBox {
    pub rect: Rect,
    pub node: NodeRef,
    pub content: BoxContent,
}

/// Whether a page may break after a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitBreak {
    Allowed,
    KeepWithNext,
    Forced,
}

/// A vertical piece of a block that is never split across pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowUnit {
    pub node: NodeRef,
    pub height: Abs,
    pub boxes: Vec<LayoutBox>,
    pub after: UnitBreak,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LayoutWarning {
    OverfullLine { node: NodeRef, overflow: Abs },
    PageOverflow { node: NodeRef, height: Abs },
}

impl LayoutWarning {
    pub fn node(&self) -> NodeRef {
        match self {
            LayoutWarning::OverfullLine { node, .. } | LayoutWarning::PageOverflow { node, .. } => {
                *node
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LayoutWarning::OverfullLine { .. } => "OverfullLine",
            LayoutWarning::PageOverflow { .. } => "PageOverflow",
        }
    }

    pub fn message(&self) -> String {
        match self {
            LayoutWarning::OverfullLine { overflow, .. } => {
                format!("Overfull line: content is {overflow} too wide")
            }
            LayoutWarning::PageOverflow { .. } => {
                "content overflows page with no break point".to_string()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    pub key: Fingerprint,
    pub identity: NodeIdentity,
    pub units: Vec<FlowUnit>,
    pub warnings: Vec<LayoutWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub boxes: Vec<LayoutBox>,
    pub warnings: Vec<LayoutWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pages {
    pub config: Fingerprint,
    pub blocks: Vec<Arc<BlockLayout>>,
    pub pages: Vec<Arc<Page>>,
    pub spans: Vec<PageSpan>,
}

impl Pages {
    pub fn warnings(&self) -> impl Iterator<Item = &LayoutWarning> {
        let blocks = self.blocks.iter().flat_map(|block| block.warnings.iter());
        let pages = self.pages.iter().flat_map(|page| page.warnings.iter());
        blocks.chain(pages)
    }

    /// The index of the page that shows a node.
    pub fn page_of(&self, node: NodeRef) -> Option<usize> {
        self.pages.iter().position(|page| page.boxes.iter().any(|b| b.node == node))
    }
}

/// The cache key of a segment's layout.
pub fn block_key(segment: &Segment, config: &LayoutConfig, metrics: &dyn Metrics) -> Fingerprint {
    let identity = Fingerprint::of(&segment.identity);
    let environment = config.fingerprint().combine(metrics.fingerprint());
    segment.fingerprint.combine(identity).combine(environment)
}

/// Lays out a document, reusing block layouts and pages from `previous`.
pub fn layout(
    tree: &DocumentTree,
    config: &LayoutConfig,
    metrics: &dyn Metrics,
    previous: Option<&Pages>,
) -> Pages {
    let reusable: FxHashMap<Fingerprint, &Arc<BlockLayout>> = previous
        .into_iter()
        .flat_map(|pages| pages.blocks.iter())
        .map(|block| (block.key, block))
        .collect();

    let blocks = tree
        .segments()
        .iter()
        .map(|segment| {
            let key = block_key(segment, config, metrics);
            match reusable.get(&key) {
                Some(block) => Arc::clone(block),
                None => Arc::new(layout_segment(tree, segment, config, metrics)),
            }
        })
        .collect();

    let result = paginate(blocks, config, previous, || Ok::<(), std::convert::Infallible>(()));
    match result {
        Ok(pages) => pages,
        Err(never) => match never {},
    }
}

#[cfg(test)]
mod tests;
