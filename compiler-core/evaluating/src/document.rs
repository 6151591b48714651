//! Assembly of evaluated documents.
//!
//! Included documents are spliced in place of their `\include` nodes,
//! headings and figures are numbered in reading order, and references are
//! resolved against labels. The resulting [`DocumentTree`] also answers
//! cursor mapping queries for editors.

use std::ops::Range;
use std::sync::Arc;

use building_types::{Fingerprint, NodeIdentity};
use files::FileId;
use itertools::Itertools;
use rowan::{TextRange, TextSize};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::{
    DocNodeId, DocumentError, DocumentNode, EvaluatedBlock, EvaluatedDocument, NodeKind, NodeRef,
};

/// A run of root nodes from one block, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub identity: NodeIdentity,
    /// The range of the block within its file.
    pub range: TextRange,
    pub block: Arc<EvaluatedBlock>,
    pub roots: Range<usize>,
    /// Covers the block and every number or reference text shown within it.
    pub fingerprint: Fingerprint,
}

impl Segment {
    pub fn roots(&self) -> &[DocNodeId] {
        &self.block.roots[self.roots.clone()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    pub text: SmolStr,
    pub label: Option<NodeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTree {
    file: FileId,
    segments: Vec<Segment>,
    blocks: FxHashMap<NodeIdentity, usize>,
    numbers: FxHashMap<NodeRef, SmolStr>,
    references: FxHashMap<NodeRef, ResolvedReference>,
    labels: FxHashMap<SmolStr, NodeRef>,
    errors: Vec<DocumentError>,
}

pub fn assemble(document: &EvaluatedDocument) -> DocumentTree {
    let mut segments = vec![];
    flatten(document, &mut segments);

    let mut blocks = FxHashMap::default();
    for (index, segment) in segments.iter().enumerate() {
        blocks.entry(segment.identity).or_insert(index);
    }

    let mut numbering = Numbering::default();
    let mut shown = vec![];
    for segment in &segments {
        let start = numbering.shown.len();
        for &root in segment.roots() {
            numbering.walk(segment, root);
        }
        shown.push(start..numbering.shown.len());
    }

    let Numbering { numbers, labels, pending, mut errors, shown: shown_nodes, .. } = numbering;

    let mut references = FxHashMap::default();
    for (node, key) in pending {
        let resolved = match labels.get(&key) {
            Some((label, text)) => ResolvedReference { text: text.clone(), label: Some(*label) },
            None => {
                errors.push(DocumentError::UnresolvedReference { key, node });
                ResolvedReference { text: SmolStr::new_static("??"), label: None }
            }
        };
        references.insert(node, resolved);
    }

    for (segment, shown) in segments.iter_mut().zip(shown) {
        let texts = shown_nodes[shown].iter().map(|node| {
            let text = numbers.get(node).or_else(|| references.get(node).map(|r| &r.text));
            Fingerprint::of(&(node, text))
        });
        let roots = (segment.roots.start, segment.roots.end);
        let base = segment.block.fingerprint.combine(Fingerprint::of(&roots));
        segment.fingerprint = Fingerprint::combine_all(std::iter::once(base).chain(texts));
    }

    let labels = labels.into_iter().map(|(key, (label, _))| (key, label)).collect();
    DocumentTree { file: document.file, segments, blocks, numbers, references, labels, errors }
}

fn flatten(document: &EvaluatedDocument, segments: &mut Vec<Segment>) {
    for entry in &document.blocks {
        let block = &entry.block;
        let mut start = 0;
        for (index, &root) in block.roots.iter().enumerate() {
            let NodeKind::Include { index: include, .. } = block.arena[root].kind else {
                continue;
            };
            push_segment(entry.range, block, start..index, segments);
            if let Some(included) = block.includes.get(include) {
                flatten(included, segments);
            }
            start = index + 1;
        }
        push_segment(entry.range, block, start..block.roots.len(), segments);
    }
}

/// Includes nested inside other nodes are spliced after the segment that
/// contains them.
fn push_segment(
    range: TextRange,
    block: &Arc<EvaluatedBlock>,
    roots: Range<usize>,
    segments: &mut Vec<Segment>,
) {
    if roots.is_empty() && !block.roots.is_empty() {
        return;
    }

    let nested = block.roots[roots.clone()]
        .iter()
        .flat_map(|&root| descendants(block, root).into_iter().skip(1))
        .filter_map(|id| match block.arena[id].kind {
            NodeKind::Include { index, .. } => Some(index),
            _ => None,
        })
        .collect_vec();

    segments.push(Segment {
        identity: block.identity,
        range,
        block: Arc::clone(block),
        roots,
        fingerprint: Fingerprint::ZERO,
    });

    for index in nested {
        if let Some(included) = block.includes.get(index) {
            flatten(included, segments);
        }
    }
}

/// The subtree of `root` in preorder.
pub fn descendants(block: &EvaluatedBlock, root: DocNodeId) -> Vec<DocNodeId> {
    let mut result = vec![];
    let mut stack = vec![root];
    while let Some(id) = stack.pop() {
        result.push(id);
        let children = block.arena[id].kind.children().collect_vec();
        stack.extend(children.into_iter().rev());
    }
    result
}

#[derive(Default)]
struct Numbering {
    sections: [u32; 3],
    figures: u32,
    heading: Option<SmolStr>,
    numbers: FxHashMap<NodeRef, SmolStr>,
    labels: FxHashMap<SmolStr, (NodeRef, SmolStr)>,
    pending: Vec<(NodeRef, SmolStr)>,
    errors: Vec<DocumentError>,
    /// Nodes whose displayed text depends on the rest of the document.
    shown: Vec<NodeRef>,
}

impl Numbering {
    fn walk(&mut self, segment: &Segment, root: DocNodeId) {
        let block = &segment.block;
        for id in descendants(block, root) {
            let node = NodeRef::new(block.identity, id);
            match &block.arena[id].kind {
                NodeKind::Heading { level, .. } => {
                    let level = usize::from(*level).clamp(1, self.sections.len());
                    self.sections[level - 1] += 1;
                    self.sections[level..].fill(0);
                    let number: SmolStr = self.sections[..level].iter().join(".").into();
                    self.numbers.insert(node, number.clone());
                    self.heading = Some(number);
                    self.shown.push(node);
                }
                NodeKind::Figure { .. } => {
                    self.figures += 1;
                    self.numbers.insert(node, self.figures.to_string().into());
                    self.shown.push(node);
                }
                NodeKind::Label(key) => {
                    let figure = block.labels.iter().find(|label| label.node == id);
                    let figure = figure.and_then(|label| label.figure);
                    let text = figure
                        .and_then(|figure| self.numbers.get(&NodeRef::new(block.identity, figure)))
                        .or(self.heading.as_ref())
                        .cloned()
                        .unwrap_or_else(|| SmolStr::new_static("??"));

                    if let Some((first, _)) = self.labels.get(key) {
                        let key = key.clone();
                        let first = *first;
                        self.errors.push(DocumentError::DuplicateLabel { key, first, second: node });
                    } else {
                        self.labels.insert(key.clone(), (node, text));
                    }
                }
                NodeKind::Reference(key) => {
                    self.pending.push((node, key.clone()));
                    self.shown.push(node);
                }
                _ => (),
            }
        }
    }
}

impl DocumentTree {
    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn errors(&self) -> &[DocumentError] {
        &self.errors
    }

    pub fn block(&self, identity: NodeIdentity) -> Option<&Segment> {
        self.blocks.get(&identity).map(|&index| &self.segments[index])
    }

    pub fn node(&self, node: NodeRef) -> Option<&DocumentNode> {
        let segment = self.block(node.block)?;
        segment.block.arena.iter().find(|(id, _)| *id == node.node).map(|(_, node)| node)
    }

    /// The number of a heading or figure.
    pub fn number(&self, node: NodeRef) -> Option<&str> {
        self.numbers.get(&node).map(SmolStr::as_str)
    }

    pub fn reference(&self, node: NodeRef) -> Option<&ResolvedReference> {
        self.references.get(&node)
    }

    pub fn label(&self, key: &str) -> Option<NodeRef> {
        self.labels.get(key).copied()
    }

    /// The innermost node at an offset; among nodes with the same span,
    /// the deepest one.
    pub fn node_at(&self, file: FileId, offset: TextSize) -> Option<NodeRef> {
        let mut best: Option<(TextSize, NodeRef)> = None;
        for segment in self.segments_at(file, offset) {
            let relative = offset - segment.range.start();
            let block = &segment.block;
            for &root in segment.roots() {
                for id in descendants(block, root) {
                    let span = block.arena[id].span;
                    if !span.contains_inclusive(relative) {
                        continue;
                    }
                    if best.is_none_or(|(length, _)| span.len() <= length) {
                        best = Some((span.len(), NodeRef::new(block.identity, id)));
                    }
                }
            }
        }
        best.map(|(_, node)| node)
    }

    /// The source location of a node.
    pub fn span(&self, node: NodeRef) -> Option<(FileId, TextRange)> {
        let segment = self.block(node.block)?;
        let span = self.node(node)?.span;
        Some((node.block.file, span + segment.range.start()))
    }

    /// Where the thing at an offset is defined: the label of a reference,
    /// or the definition of a macro.
    pub fn definition(&self, file: FileId, offset: TextSize) -> Option<(FileId, TextRange)> {
        if let Some(node) = self.node_at(file, offset) {
            if let Some(ResolvedReference { label: Some(label), .. }) = self.references.get(&node) {
                return self.span(*label);
            }
        }

        let read = self.segments_at(file, offset).find_map(|segment| {
            let relative = offset - segment.range.start();
            let reads = segment.block.reads.iter();
            reads.filter(|read| read.span.contains_inclusive(relative)).min_by_key(|read| read.span.len())
        })?;

        let origin = read.origin?;
        let segment = self.block(origin.identity)?;
        Some((origin.identity.file, origin.span + segment.range.start()))
    }

    fn segments_at(&self, file: FileId, offset: TextSize) -> impl Iterator<Item = &Segment> {
        self.segments.iter().filter(move |segment| {
            segment.identity.file == file && segment.range.contains_inclusive(offset)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use files::{FileId, SourceStore};
    use rowan::{TextRange, TextSize};

    use super::{DocumentTree, assemble};
    use crate::{DocumentError, Include, Includes, NodeKind, evaluate_document};

    fn assemble_source(source: &str) -> (FileId, DocumentTree) {
        let mut store = SourceStore::default();
        let file = store.insert("main.fol", source);
        let (parsed, _) = parsing::parse_text(source);
        let document = evaluate_document(file, &parsed.syntax_node(), &Includes::default());
        (file, assemble(&document))
    }

    fn numbers(tree: &DocumentTree) -> Vec<String> {
        let mut numbers = vec![];
        for segment in tree.segments() {
            for &root in segment.roots() {
                for id in super::descendants(&segment.block, root) {
                    let node = crate::NodeRef::new(segment.identity, id);
                    if let Some(number) = tree.number(node) {
                        numbers.push(number.to_string());
                    }
                }
            }
        }
        numbers
    }

    fn offset(source: &str, needle: &str) -> TextSize {
        TextSize::new(source.find(needle).unwrap() as u32)
    }

    #[test]
    fn test_heading_numbers() {
        let source = "\\section{A}\n\n\\subsection{B}\n\n\\subsection{C}\n\n\\section{D}\n\n\\subsubsection{E}";
        let (_, tree) = assemble_source(source);
        assert_eq!(numbers(&tree), ["1", "1.1", "1.2", "2", "2.0.1"]);
    }

    #[test]
    fn test_references_resolve_forward_and_backward() {
        let source = "See \\ref{fig:a}.\n\n\\section{Intro}\\label{sec:intro}\n\n\\begin{figure}\nx\\label{fig:a}\n\\end{figure}\n\nBack to \\ref{sec:intro}.";
        let (file, tree) = assemble_source(source);
        assert!(tree.errors().is_empty());

        let forward = tree.node_at(file, offset(source, "\\ref{fig:a}") + TextSize::new(1)).unwrap();
        assert_eq!(tree.reference(forward).unwrap().text, "1");

        let backward = tree.node_at(file, offset(source, "\\ref{sec:intro}") + TextSize::new(1)).unwrap();
        assert_eq!(tree.reference(backward).unwrap().text, "1");
    }

    #[test]
    fn test_unresolved_reference() {
        let (_, tree) = assemble_source("\\ref{nowhere}");
        let [DocumentError::UnresolvedReference { key, node }] = tree.errors() else {
            panic!("expected an unresolved reference");
        };
        assert_eq!(key, "nowhere");
        assert_eq!(tree.reference(*node).unwrap().text, "??");
        assert_eq!(tree.reference(*node).unwrap().label, None);
    }

    #[test]
    fn test_duplicate_label_keeps_first() {
        let source = "\\section{A}\\label{x}\n\n\\section{B}\\label{x}\n\n\\ref{x}";
        let (_, tree) = assemble_source(source);
        assert!(matches!(tree.errors(), [DocumentError::DuplicateLabel { .. }]));

        let label = tree.label("x").unwrap();
        let (_, span) = tree.span(label).unwrap();
        assert_eq!(span, TextRange::new(11.into(), 20.into()));
    }

    #[test]
    fn test_node_at_and_span() {
        let source = "Some \\emph{text} here\n\n\\section{Title}";
        let (file, tree) = assemble_source(source);

        let node = tree.node_at(file, offset(source, "text")).unwrap();
        assert!(matches!(tree.node(node).unwrap().kind, NodeKind::Text(_)));
        let (span_file, span) = tree.span(node).unwrap();
        assert_eq!(span_file, file);
        assert_eq!(&source[span], "text");

        let heading = tree.node_at(file, offset(source, "\\section")).unwrap();
        assert!(matches!(tree.node(heading).unwrap().kind, NodeKind::Heading { .. }));
        assert_eq!(&source[tree.span(heading).unwrap().1], "\\section{Title}");
    }

    #[test]
    fn test_definition_of_reference_and_macro() {
        let source = "\\def{name}{World}\n\nHello {name}\\label{here}\n\n\\ref{here}";
        let (file, tree) = assemble_source(source);

        let (_, span) = tree.definition(file, offset(source, "{name}\\label") + TextSize::new(1)).unwrap();
        assert_eq!(&source[span], "\\def{name}{World}");

        let (_, span) = tree.definition(file, offset(source, "\\ref") + TextSize::new(2)).unwrap();
        assert_eq!(&source[span], "\\label{here}");
    }

    #[test]
    fn test_includes_are_spliced() {
        let mut store = SourceStore::default();
        let main = store.insert("main.fol", "");
        let chapter = store.insert("chapter.fol", "");

        let (parsed, _) = parsing::parse_text("\\section{Chapter}\\label{ch}");
        let included = evaluate_document(chapter, &parsed.syntax_node(), &Includes::default());

        let mut includes = Includes::default();
        includes.insert("chapter".into(), Include::Resolved(Arc::new(included)));
        let source = "\\section{Intro}\n\nBefore \\include{chapter} after \\ref{ch}";
        let (parsed, _) = parsing::parse_text(source);
        let document = evaluate_document(main, &parsed.syntax_node(), &includes);
        let tree = assemble(&document);

        let files: Vec<_> = tree.segments().iter().map(|segment| segment.identity.file).collect();
        assert_eq!(files, [main, main, chapter, main]);
        assert_eq!(numbers(&tree), ["1", "2"]);
        assert!(tree.errors().is_empty());
    }

    #[test]
    fn test_segment_fingerprint_tracks_numbers() {
        let (_, before) = assemble_source("\\section{A}\n\n\\section{B}");
        let (_, after) = assemble_source("\\section{A}\n\n\\section{Z}\n\n\\section{B}");

        let last = |tree: &DocumentTree| tree.segments().last().unwrap().fingerprint;
        assert_ne!(last(&before), last(&after));

        let first = |tree: &DocumentTree| tree.segments()[0].fingerprint;
        assert_eq!(first(&before), first(&after));
    }
}
