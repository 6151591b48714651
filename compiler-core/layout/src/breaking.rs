//! Line breaking over box, glue and penalty items.
//!
//! Legal breakpoints are glue that follows a box and penalties below
//! [`INFINITE_PENALTY`]. Glue and penalties directly after a break are
//! discarded. A line whose content cannot shrink to the line width is
//! overfull; it is only produced when a single unbreakable run is wider
//! than the line.

use geometry::Abs;

use crate::Breaking;
use crate::inline::{FORCED_PENALTY, INFINITE_PENALTY, Item};

/// Badness of a line that cannot stretch enough.
const INFINITE_BADNESS: i64 = 10_000;
const LINE_PENALTY: i64 = 10;
const OVERFULL_DEMERITS: i64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line {
    /// Items of the line, excluding the breakpoint.
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) natural: Abs,
    pub(crate) stretch: Abs,
    pub(crate) shrink: Abs,
    /// Lines ending in a forced break are set at their natural width.
    pub(crate) ragged: bool,
}

impl Line {
    pub(crate) fn overflow(&self, width: Abs) -> Abs {
        (self.natural - self.shrink - width).max(Abs::ZERO)
    }

    /// The adjusted width of a glue item on this line.
    pub(crate) fn glue(&self, width: Abs, glue: (Abs, Abs, Abs)) -> Abs {
        let (natural, stretch, shrink) = glue;
        if self.natural < width && !self.ragged && !self.stretch.is_zero() {
            natural + (width - self.natural).scale(stretch.to_raw(), self.stretch.to_raw())
        } else if self.natural > width && !self.shrink.is_zero() {
            let excess = (self.natural - width).min(self.shrink);
            natural - excess.scale(shrink.to_raw(), self.shrink.to_raw())
        } else {
            natural
        }
    }
}

struct Measure {
    width: Vec<Abs>,
    stretch: Vec<Abs>,
    shrink: Vec<Abs>,
}

impl Measure {
    fn new(items: &[Item]) -> Measure {
        let mut measure = Measure {
            width: vec![Abs::ZERO],
            stretch: vec![Abs::ZERO],
            shrink: vec![Abs::ZERO],
        };
        let (mut width, mut stretch, mut shrink) = (Abs::ZERO, Abs::ZERO, Abs::ZERO);
        for item in items {
            width += item.width();
            if let Item::Glue { stretch: s, shrink: h, .. } = item {
                stretch += *s;
                shrink += *h;
            }
            measure.width.push(width);
            measure.stretch.push(stretch);
            measure.shrink.push(shrink);
        }
        measure
    }

    fn line(&self, items: &[Item], start: usize, end: usize) -> Line {
        let start = start.min(end);
        Line {
            start,
            end,
            natural: self.width[end] - self.width[start],
            stretch: self.stretch[end] - self.stretch[start],
            shrink: self.shrink[end] - self.shrink[start],
            ragged: items[end].is_forced(),
        }
    }
}

fn breakpoints(items: &[Item]) -> Vec<usize> {
    let mut breakpoints = vec![];
    for (index, item) in items.iter().enumerate() {
        let legal = match item {
            Item::Glue { .. } => index > 0 && items[index - 1].is_box(),
            Item::Penalty { cost } => *cost < INFINITE_PENALTY,
            Item::Box { .. } => false,
        };
        if legal {
            breakpoints.push(index);
        }
    }
    breakpoints
}

/// The first item of a line that starts after `index`.
fn line_start(items: &[Item], mut index: usize) -> usize {
    while index < items.len() && !items[index].is_box() && !items[index].is_forced() {
        index += 1;
    }
    index
}

pub(crate) fn break_lines(items: &[Item], width: Abs, breaking: Breaking) -> Vec<Line> {
    if items.is_empty() {
        return vec![];
    }
    match breaking {
        Breaking::Greedy => greedy(items, width),
        Breaking::Optimal => optimal(items, width),
    }
}

fn greedy(items: &[Item], width: Abs) -> Vec<Line> {
    let measure = Measure::new(items);
    let breakpoints = breakpoints(items);

    let mut lines = vec![];
    let mut start = line_start(items, 0);
    let mut next = 0;
    while next < breakpoints.len() {
        let mut chosen = next;
        for (candidate, &index) in breakpoints.iter().enumerate().skip(next) {
            let line = measure.line(items, start, index);
            if line.natural - line.shrink > width && candidate > next {
                break;
            }
            chosen = candidate;
            if line.natural - line.shrink > width || items[index].is_forced() {
                break;
            }
        }

        let end = breakpoints[chosen];
        lines.push(measure.line(items, start, end));
        start = line_start(items, end + 1);
        next = chosen + 1;
    }
    lines
}

#[derive(Debug, Clone, Copy)]
struct Node {
    demerits: i64,
    previous: usize,
}

/// Total-fit breaking; node `0` is the start of the paragraph and node
/// `k` the `k`-th breakpoint.
fn optimal(items: &[Item], width: Abs) -> Vec<Line> {
    let measure = Measure::new(items);
    let breakpoints = breakpoints(items);
    let start_of = |node: usize| match node {
        0 => line_start(items, 0),
        node => line_start(items, breakpoints[node - 1] + 1),
    };

    let mut nodes: Vec<Option<Node>> = vec![None; breakpoints.len() + 1];
    nodes[0] = Some(Node { demerits: 0, previous: 0 });
    let mut floor = 0;

    for node in 1..=breakpoints.len() {
        let end = breakpoints[node - 1];
        let penalty = match items[end] {
            Item::Penalty { cost } => cost,
            _ => 0,
        };

        let mut best: Option<Node> = None;
        for previous in (floor..node).rev() {
            let Some(Node { demerits, .. }) = nodes[previous] else { continue };
            let line = measure.line(items, start_of(previous), end);
            if line.natural - line.shrink > width {
                break;
            }
            let total = demerits + line_demerits(&line, width, penalty);
            if best.is_none_or(|best| total < best.demerits) {
                best = Some(Node { demerits: total, previous });
            }
        }

        if best.is_none() {
            let previous = (floor..node).rev().find(|&previous| nodes[previous].is_some());
            best = previous.and_then(|previous| {
                let demerits = nodes[previous]?.demerits;
                Some(Node { demerits: demerits + OVERFULL_DEMERITS, previous })
            });
        }

        nodes[node] = best;
        if items[end].is_forced() {
            floor = node;
        }
    }

    let mut path = vec![];
    let mut node = breakpoints.len();
    while node > 0 {
        path.push(node);
        let Some(Node { previous, .. }) = nodes[node] else { break };
        node = previous;
    }
    path.reverse();

    let mut lines = vec![];
    let mut previous = 0;
    for node in path {
        lines.push(measure.line(items, start_of(previous), breakpoints[node - 1]));
        previous = node;
    }
    lines
}

fn line_demerits(line: &Line, width: Abs, penalty: i64) -> i64 {
    let badness = if line.natural <= width {
        if line.ragged { 0 } else { badness(width - line.natural, line.stretch) }
    } else {
        badness(line.natural - width, line.shrink)
    };
    let base = (LINE_PENALTY + badness).pow(2);
    match penalty {
        penalty if penalty > 0 => base + penalty.pow(2),
        penalty if penalty > FORCED_PENALTY => base - penalty.pow(2),
        _ => base,
    }
}

/// Approximates `100 (t / s)^3` in integers.
fn badness(t: Abs, s: Abs) -> i64 {
    let (t, s) = (t.to_raw(), s.to_raw());
    if t == 0 {
        return 0;
    }
    if s <= 0 {
        return INFINITE_BADNESS;
    }
    let ratio = if t <= 7_230_584 {
        (t * 297) / s
    } else if s >= 1_663_497 {
        t / (s / 297)
    } else {
        t
    };
    if ratio > 1290 {
        INFINITE_BADNESS
    } else {
        (ratio * ratio * ratio + 0x20000) / 0x40000
    }
}
