//! Distribution of flow units over pages.
//!
//! Pagination is incremental. Pages before the first changed block are
//! taken from the previous result as long as filling them never looked at
//! a changed block. Once a new page starts where an old page started within
//! the unchanged tail of the flow, the remaining old pages are reused too.

use std::sync::Arc;

use geometry::{Abs, Rect};

use crate::{BlockLayout, FlowUnit, LayoutConfig, LayoutWarning, Page, Pages, UnitBreak};

/// A unit within the flow of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowPosition {
    pub block: usize,
    pub unit: usize,
}

/// The units shown on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageSpan {
    pub start: FlowPosition,
    pub end: FlowPosition,
    /// The last block examined while filling the page; the number of
    /// blocks when the end of the flow was reached.
    pub inspected: usize,
}

impl PageSpan {
    fn shift(self, delta: isize) -> PageSpan {
        let shift = |index: usize| index.saturating_add_signed(delta);
        PageSpan {
            start: FlowPosition { block: shift(self.start.block), ..self.start },
            end: FlowPosition { block: shift(self.end.block), ..self.end },
            inspected: shift(self.inspected),
        }
    }
}

struct Flow<'a> {
    blocks: &'a [Arc<BlockLayout>],
}

impl Flow<'_> {
    fn end(&self) -> FlowPosition {
        FlowPosition { block: self.blocks.len(), unit: 0 }
    }

    /// Moves past blocks without any further units.
    fn normalize(&self, mut position: FlowPosition) -> FlowPosition {
        while position.block < self.blocks.len()
            && position.unit >= self.blocks[position.block].units.len()
        {
            position = FlowPosition { block: position.block + 1, unit: 0 };
        }
        if position.block >= self.blocks.len() { self.end() } else { position }
    }

    fn next(&self, position: FlowPosition) -> FlowPosition {
        self.normalize(FlowPosition { unit: position.unit + 1, ..position })
    }

    fn unit(&self, position: FlowPosition) -> Option<&FlowUnit> {
        self.blocks.get(position.block)?.units.get(position.unit)
    }

    /// The height of a unit and every unit kept with it, and the last
    /// block that was looked at.
    fn chain(&self, mut position: FlowPosition) -> (Abs, usize) {
        let mut height = Abs::ZERO;
        while let Some(unit) = self.unit(position) {
            height += unit.height;
            if unit.after != UnitBreak::KeepWithNext {
                return (height, position.block);
            }
            position = self.next(position);
        }
        (height, self.blocks.len())
    }

    fn fill(&self, start: FlowPosition, content: Rect) -> (Page, PageSpan) {
        let mut page = Page::default();
        let mut position = start;
        let mut inspected = start.block;
        let mut y = Abs::ZERO;

        while let Some(unit) = self.unit(position) {
            inspected = inspected.max(position.block);
            if !y.is_zero() {
                let (chain, last) = self.chain(position);
                inspected = inspected.max(last);
                let fits = y + unit.height <= content.size.height;
                let chain_fits = y + chain <= content.size.height;
                if !fits || (!chain_fits && chain <= content.size.height) {
                    break;
                }
            } else if unit.height > content.size.height {
                page.warnings.push(LayoutWarning::PageOverflow { node: unit.node, height: unit.height });
            }

            page.boxes.extend(unit.boxes.iter().cloned().map(|mut b| {
                b.rect.origin = b.rect.origin.offset(content.origin.x, content.origin.y + y);
                b
            }));
            y += unit.height;
            position = self.next(position);

            if unit.after == UnitBreak::Forced && !y.is_zero() {
                break;
            }
        }

        // Empty blocks skipped on the way to the next page start count as
        // inspected, or turning one into content would not invalidate this page.
        inspected = inspected.max(position.block.min(self.blocks.len()));
        if position == self.end() {
            inspected = self.blocks.len();
        }
        (page, PageSpan { start, end: position, inspected })
    }
}

/// Paginates block layouts, calling `checkpoint` before each page.
pub fn paginate<E>(
    blocks: Vec<Arc<BlockLayout>>,
    config: &LayoutConfig,
    previous: Option<&Pages>,
    mut checkpoint: impl FnMut() -> Result<(), E>,
) -> Result<Pages, E> {
    let fingerprint = config.fingerprint();
    let content = config.geometry.content();
    let flow = Flow { blocks: &blocks };
    let previous = previous.filter(|previous| previous.config == fingerprint);

    let mut pages = vec![];
    let mut spans = vec![];
    let mut position = flow.normalize(FlowPosition::default());

    let mut tail = None;
    if let Some(previous) = previous {
        let shared = blocks.len().min(previous.blocks.len());
        let same = |(new, old): (&Arc<BlockLayout>, &Arc<BlockLayout>)| Arc::ptr_eq(new, old);
        let changed = blocks.iter().zip(&previous.blocks).take_while(|&pair| same(pair)).count();
        let unchanged = blocks.iter().rev().zip(previous.blocks.iter().rev());
        let unchanged = unchanged.take_while(|&pair| same(pair)).count().min(shared - changed);

        for (page, span) in previous.pages.iter().zip(&previous.spans) {
            if span.inspected >= changed {
                break;
            }
            pages.push(Arc::clone(page));
            spans.push(*span);
            position = span.end;
        }

        let delta = blocks.len() as isize - previous.blocks.len() as isize;
        tail = Some((previous, blocks.len() - unchanged, delta));
        tracing::debug!(target: "layout", reused = pages.len(), changed, unchanged);
    }

    while position != flow.end() {
        checkpoint()?;
        let (page, span) = flow.fill(position, content);
        pages.push(Arc::new(page));
        spans.push(span);
        position = span.end;

        let Some((previous, tail_start, delta)) = tail else { continue };
        if position.block < tail_start || position == flow.end() {
            continue;
        }
        let old = FlowPosition { block: position.block.saturating_add_signed(-delta), ..position };
        let Some(index) = previous.spans.iter().position(|span| span.start == old) else {
            continue;
        };
        tracing::debug!(target: "layout", resumed = pages.len(), reused = previous.pages.len() - index);
        pages.extend(previous.pages[index..].iter().cloned());
        spans.extend(previous.spans[index..].iter().map(|span| span.shift(delta)));
        break;
    }

    if pages.is_empty() {
        pages.push(Arc::new(Page::default()));
        spans.push(PageSpan { start: position, end: position, inspected: blocks.len() });
    }

    Ok(Pages { config: fingerprint, blocks, pages, spans })
}
