//! Layout of a single segment into flow units.

use std::sync::Arc;

use evaluating::{DocNodeId, DocumentTree, EvaluatedBlock, NodeKind, NodeRef, Segment};
use geometry::{Abs, Point, Rect, Size};
use smol_str::{SmolStr, format_smolstr};

use crate::breaking::break_lines;
use crate::inline::{Inline, Item};
use crate::{
    BlockLayout, BoxContent, FlowUnit, LayoutBox, LayoutConfig, LayoutWarning, Metrics, Style,
    UnitBreak, block_key,
};

const PLOT_HEIGHT: Abs = Abs::pt(144);
const IMAGE_HEIGHT: Abs = Abs::pt(72);
const LIST_INDENT: Abs = Abs::pt(18);

pub fn layout_segment(
    tree: &DocumentTree,
    segment: &Segment,
    config: &LayoutConfig,
    metrics: &dyn Metrics,
) -> BlockLayout {
    let content = config.geometry.content();
    let mut builder = BlockBuilder {
        tree,
        block: &segment.block,
        config,
        metrics,
        warnings: vec![],
    };

    let mut units = vec![];
    for &root in segment.roots() {
        units.extend(builder.block(root, Abs::ZERO, content.size.width));
    }

    tracing::debug!(target: "layout", identity = ?segment.identity, units = units.len());
    BlockLayout {
        key: block_key(segment, config, metrics),
        identity: segment.identity,
        units,
        warnings: builder.warnings,
    }
}

struct BlockBuilder<'a> {
    tree: &'a DocumentTree,
    block: &'a EvaluatedBlock,
    config: &'a LayoutConfig,
    metrics: &'a dyn Metrics,
    warnings: Vec<LayoutWarning>,
}

impl<'a> BlockBuilder<'a> {
    fn node(&self, id: DocNodeId) -> NodeRef {
        NodeRef::new(self.block.identity, id)
    }

    fn inline(&self, size: Abs) -> Inline<'a> {
        Inline::new(self.tree, self.block, self.metrics, size, size)
    }

    fn block(&mut self, id: DocNodeId, x: Abs, width: Abs) -> Vec<FlowUnit> {
        let node = self.node(id);
        let block = self.block;
        match &block.arena[id].kind {
            NodeKind::Paragraph(children) => {
                let mut inline = self.inline(self.config.font_size);
                inline.nodes(children, Style::Regular);
                let mut units = self.lines(node, &inline.finish(), x, width, self.config.leading);
                self.space_after(&mut units);
                units
            }
            NodeKind::Heading { level, content } => {
                let size = self.config.heading_size(*level);
                let mut inline = self.inline(size);
                if let Some(number) = self.tree.number(node) {
                    inline.text(number.into(), node, Style::Strong);
                    inline.space();
                }
                inline.nodes(content, Style::Strong);
                let leading = self.config.leading_for(size);
                let mut units = self.lines(node, &inline.finish(), x, width, leading);
                for unit in &mut units {
                    unit.after = UnitBreak::KeepWithNext;
                }
                self.space_after(&mut units);
                units
            }
            NodeKind::DisplayMath(text) => {
                let size = self.config.font_size;
                let leading = self.config.leading;
                let natural = self.metrics.measure(text, size);
                if natural > width {
                    self.warnings.push(LayoutWarning::OverfullLine { node, overflow: natural - width });
                }
                let offset = ((width - natural) / 2).max(Abs::ZERO);
                let rect = Rect::new(
                    Point::new(x + offset, leading / 2),
                    Size::new(natural, size),
                );
                let content = BoxContent::Math { text: text.clone(), size, display: true };
                let boxes = vec![LayoutBox { rect, node, content }];
                let mut units = vec![FlowUnit { node, height: leading * 2, boxes, after: UnitBreak::Allowed }];
                self.space_after(&mut units);
                units
            }
            NodeKind::Figure { content, caption } => {
                let mut units = self.flow(content, x, width);
                if let Some(caption) = caption {
                    let mut inline = self.inline(self.config.font_size);
                    if let Some(number) = self.tree.number(node) {
                        inline.text(format_smolstr!("Figure {number}:"), node, Style::Strong);
                        inline.space();
                    }
                    inline.nodes(caption, Style::Regular);
                    units.extend(self.lines(node, &inline.finish(), x, width, self.config.leading));
                }
                let mut units = vec![stack(node, units)];
                self.space_after(&mut units);
                units
            }
            NodeKind::Plot(spec) => {
                let size = Size::new(
                    spec.width.unwrap_or(width).min(width),
                    spec.height.unwrap_or(PLOT_HEIGHT),
                );
                let content = BoxContent::Plot(Arc::clone(spec));
                let mut units = vec![self.figure_box(node, x, size, content)];
                self.space_after(&mut units);
                units
            }
            NodeKind::Image(image) => {
                let size = Size::new(
                    image.width.unwrap_or(width).min(width),
                    image.height.unwrap_or(IMAGE_HEIGHT),
                );
                let content = BoxContent::Image(image.path.clone());
                let mut units = vec![self.figure_box(node, x, size, content)];
                self.space_after(&mut units);
                units
            }
            NodeKind::Table { rows, caption } => {
                let columns = rows
                    .iter()
                    .map(|&row| block.arena[row].kind.children().count())
                    .max()
                    .unwrap_or(0)
                    .max(1);
                let column = width / columns as i64;

                let mut units = vec![];
                for &row in rows {
                    let row_node = self.node(row);
                    let mut cells = vec![];
                    for (index, cell) in block.arena[row].kind.children().enumerate() {
                        let NodeKind::Cell(children) = &block.arena[cell].kind else { continue };
                        let mut inline = self.inline(self.config.font_size);
                        inline.nodes(children, Style::Regular);
                        let cell_node = self.node(cell);
                        let cell_x = x + column * index as i64;
                        let items = inline.finish();
                        let lines = self.lines(cell_node, &items, cell_x, column, self.config.leading);
                        cells.push(stack(cell_node, lines));
                    }
                    units.push(side_by_side(row_node, cells, self.config.leading));
                }

                if let Some(caption) = caption {
                    let mut inline = self.inline(self.config.font_size);
                    inline.nodes(caption, Style::Regular);
                    units.extend(self.lines(node, &inline.finish(), x, width, self.config.leading));
                }
                self.space_after(&mut units);
                units
            }
            NodeKind::List { ordered, items } => {
                let mut units = vec![];
                for (index, &item) in items.iter().enumerate() {
                    let NodeKind::Item(children) = &block.arena[item].kind else { continue };
                    let item_node = self.node(item);
                    let mut content = self.flow(children, x + LIST_INDENT, width - LIST_INDENT);
                    if content.is_empty() {
                        content.push(FlowUnit {
                            node: item_node,
                            height: self.config.leading,
                            boxes: vec![],
                            after: UnitBreak::Allowed,
                        });
                    }

                    let marker: SmolStr =
                        if *ordered { format_smolstr!("{}.", index + 1) } else { "•".into() };
                    let size = self.config.font_size;
                    let marker_width = self.metrics.measure(&marker, size);
                    let rect = Rect::new(Point::new(x, Abs::ZERO), Size::new(marker_width, size));
                    let content_box = BoxContent::Text { text: marker, size, style: Style::Regular };
                    content[0].boxes.insert(0, LayoutBox { rect, node: item_node, content: content_box });
                    units.extend(content);
                }
                units
            }
            NodeKind::PageBreak => {
                vec![FlowUnit { node, height: Abs::ZERO, boxes: vec![], after: UnitBreak::Forced }]
            }
            _ => vec![],
        }
    }

    /// Lays out mixed content; runs of inline nodes form paragraphs.
    fn flow(&mut self, children: &[DocNodeId], x: Abs, width: Abs) -> Vec<FlowUnit> {
        let block = self.block;
        let mut units = vec![];
        let mut run: Vec<DocNodeId> = vec![];
        let flush = |builder: &mut Self, run: &mut Vec<DocNodeId>, units: &mut Vec<FlowUnit>| {
            if let Some(&first) = run.first() {
                let mut inline = builder.inline(builder.config.font_size);
                inline.nodes(run, Style::Regular);
                let node = builder.node(first);
                units.extend(builder.lines(node, &inline.finish(), x, width, builder.config.leading));
                run.clear();
            }
        };

        for &child in children {
            if block.arena[child].kind.is_block() {
                flush(self, &mut run, &mut units);
                units.extend(self.block(child, x, width));
            } else {
                run.push(child);
            }
        }
        flush(self, &mut run, &mut units);
        units
    }

    /// Sets a paragraph's items into lines, one flow unit per line.
    fn lines(&mut self, node: NodeRef, items: &[Item], x: Abs, width: Abs, leading: Abs) -> Vec<FlowUnit> {
        let mut units = vec![];
        for line in break_lines(items, width, self.config.breaking) {
            let overflow = line.overflow(width);
            if !overflow.is_zero() {
                self.warnings.push(LayoutWarning::OverfullLine { node, overflow });
            }

            let mut boxes = vec![];
            let mut cursor = x;
            let mut height = leading;
            for item in &items[line.start..line.end] {
                match item {
                    Item::Box { width: advance, height: ascent, node, content } => {
                        let rect = Rect::new(Point::new(cursor, Abs::ZERO), Size::new(*advance, *ascent));
                        boxes.push(LayoutBox { rect, node: *node, content: content.clone() });
                        cursor += *advance;
                        height = height.max(*ascent);
                    }
                    Item::Glue { width: natural, stretch, shrink } => {
                        cursor += line.glue(width, (*natural, *stretch, *shrink));
                    }
                    Item::Penalty { .. } => (),
                }
            }
            units.push(FlowUnit { node, height, boxes, after: UnitBreak::Allowed });
        }
        units
    }

    fn figure_box(&mut self, node: NodeRef, x: Abs, size: Size, content: BoxContent) -> FlowUnit {
        let rect = Rect::new(Point::new(x, Abs::ZERO), size);
        FlowUnit { node, height: size.height, boxes: vec![LayoutBox { rect, node, content }], after: UnitBreak::Allowed }
    }

    fn space_after(&self, units: &mut [FlowUnit]) {
        if let Some(last) = units.last_mut() {
            last.height += self.config.paragraph_spacing;
        }
    }
}

/// Joins units vertically into one unbreakable unit.
fn stack(node: NodeRef, units: Vec<FlowUnit>) -> FlowUnit {
    let mut boxes = vec![];
    let mut y = Abs::ZERO;
    for unit in units {
        boxes.extend(unit.boxes.into_iter().map(|mut b| {
            b.rect.origin.y += y;
            b
        }));
        y += unit.height;
    }
    FlowUnit { node, height: y, boxes, after: UnitBreak::Allowed }
}

/// Joins units horizontally; their boxes already carry their columns.
fn side_by_side(node: NodeRef, units: Vec<FlowUnit>, minimum: Abs) -> FlowUnit {
    let height = units.iter().map(|unit| unit.height).fold(minimum, Abs::max);
    let boxes = units.into_iter().flat_map(|unit| unit.boxes).collect();
    FlowUnit { node, height, boxes, after: UnitBreak::Allowed }
}
