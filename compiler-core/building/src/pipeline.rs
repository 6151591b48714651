//! The stages behind the engine's queries.
//!
//! Each function takes the engine to reach the shared memos and to check
//! for cancellation between blocks; the query wrappers in the engine take
//! care of dependency tracking.

use std::sync::Arc;

use building_types::{Fingerprint, NodeIdentity, QueryResult};
use diagnostics::{
    Collector, Diagnostic, DiagnosticKind, DiagnosticsContext, Severity, Span, ToDiagnostics,
};
use evaluating::{
    BlockContext, BlockEntry, DocumentTree, EvaluatedDocument, Environment, Includes, NodeKind,
    NodeRef,
};
use files::{FileId, SourceVersion, TextEdit};
use itertools::Itertools;
use layout::{LayoutConfig, Pages};
use parsing::FullParsedDocument;
use rowan::ast::AstNode;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use syntax::{SyntaxNode, cst};

use crate::QueryEngine;
use crate::memo::DependencyCycle;
use crate::plot::{Artifacts, PlotEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSource {
    pub version: u32,
    pub text: Arc<str>,
    pub parsed: FullParsedDocument,
}

impl ParsedSource {
    pub fn syntax_node(&self) -> SyntaxNode {
        self.parsed.0.syntax_node()
    }
}

/// A name used in `\include{name}` and the file it currently refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeTarget {
    pub name: SmolStr,
    pub file: Option<FileId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedFile {
    pub document: Arc<EvaluatedDocument>,
    /// Dependency edges between blocks that would have closed a cycle.
    pub refused: Vec<DependencyCycle>,
}

/// The outcome of compiling one document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compiled {
    pub file: FileId,
    pub version: u32,
    pub document: Arc<DocumentTree>,
    pub pages: Arc<Pages>,
    pub artifacts: Arc<Artifacts>,
    pub diagnostics: Arc<[Diagnostic]>,
}

impl Compiled {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|diagnostic| matches!(diagnostic.severity, Severity::Error))
    }
}

/// Parses a new version, reusing as much of the previous parse as possible.
pub(crate) fn parse(previous: Option<&ParsedSource>, source: &SourceVersion) -> ParsedSource {
    let parsed = match previous {
        Some(previous) if previous.text == source.text => previous.parsed.clone(),
        Some(previous) => {
            let edit = match &source.edit {
                Some(edit) if source.version == previous.version + 1 => edit.clone(),
                _ => TextEdit::diff(&previous.text, &source.text),
            };
            parsing::reparse(&previous.parsed, &edit, &source.text)
        }
        None => parsing::parse_text(&source.text),
    };
    ParsedSource { version: source.version, text: Arc::clone(&source.text), parsed }
}

/// Names used by `\include` commands, sorted and without duplicates.
pub(crate) fn include_names(root: &SyntaxNode) -> Vec<SmolStr> {
    root.descendants()
        .filter_map(cst::Command::cast)
        .filter(|command| command.name().as_deref() == Some("include"))
        .filter_map(|command| command.arguments().next())
        .map(|argument| SmolStr::new(argument.plain_text()))
        .filter(|name| !name.is_empty())
        .sorted()
        .dedup()
        .collect()
}

pub(crate) fn evaluate(
    engine: &QueryEngine,
    file: FileId,
    parsed: &ParsedSource,
    includes: &Includes,
    previous: Option<&EvaluatedFile>,
) -> QueryResult<EvaluatedFile> {
    let caches = engine.caches();
    let revision = engine.revision();
    let root = parsed.syntax_node();

    let global = Environment::global();
    let mut module = Environment::module(&global);
    let mut blocks = vec![];
    let mut refused = vec![];

    for (identity, block) in evaluating::block_identities(file, &root) {
        engine.checkpoint()?;

        let closure = evaluating::name_closure(&block, &module, includes);
        let key = closure.key(identity.fingerprint, includes);
        let context = BlockContext { identity, key };

        let fingerprint = key.combine(Fingerprint::of(&identity));
        let evaluated = caches.blocks.get_or_compute(fingerprint, identity, revision, || {
            Ok(Arc::new(evaluating::evaluate_block(&context, &block, &module, includes)))
        })?;

        let reads = evaluated
            .reads
            .iter()
            .filter_map(|read| read.origin.as_ref())
            .filter(|origin| origin.identity != identity)
            .map(|origin| origin.identity);
        let included = evaluated
            .includes
            .iter()
            .flat_map(|document| document.blocks.iter().map(|entry| entry.block.identity));
        let producers = reads.chain(included).unique().collect_vec();

        for cycle in caches.blocks.record_edges(identity, producers) {
            tracing::warn!(target: "building::engine", ?cycle, "refused dependency");
            caches.blocks.invalidate(identity);
            refused.push(cycle);
        }

        module.extend(evaluated.exports.iter().cloned());
        blocks.push(BlockEntry { range: block.text_range(), block: evaluated });
    }

    if let Some(previous) = previous {
        let current: FxHashSet<NodeIdentity> =
            blocks.iter().map(|entry| entry.block.identity).collect();
        let retired = previous
            .document
            .blocks
            .iter()
            .map(|entry| entry.block.identity)
            .filter(|identity| !current.contains(identity));
        for identity in retired {
            caches.blocks.retire(identity);
            caches.layouts.retire(identity);
        }
    }

    let document = Arc::new(EvaluatedDocument::new(file, blocks));
    Ok(EvaluatedFile { document, refused })
}

pub(crate) fn lay_out(
    engine: &QueryEngine,
    tree: &DocumentTree,
    config: &LayoutConfig,
    previous: Option<&Pages>,
) -> QueryResult<Pages> {
    let caches = engine.caches();
    let revision = engine.revision();
    let metrics = &*caches.metrics;

    let mut blocks = Vec::with_capacity(tree.segments().len());
    for segment in tree.segments() {
        engine.checkpoint()?;
        let key = layout::block_key(segment, config, metrics);
        let block = caches.layouts.get_or_compute(key, segment.identity, revision, || {
            Ok(Arc::new(layout::layout_segment(tree, segment, config, metrics)))
        })?;
        blocks.push(block);
    }

    layout::paginate(blocks, config, previous, || engine.checkpoint())
}

pub(crate) fn render_plots(engine: &QueryEngine, tree: &DocumentTree) -> QueryResult<Artifacts> {
    let caches = engine.caches();
    let revision = engine.revision();

    let mut seen = FxHashSet::default();
    let mut plots = vec![];
    for segment in tree.segments() {
        if !seen.insert(segment.identity) {
            continue;
        }
        for &id in &segment.block.plots {
            let NodeKind::Plot(spec) = &segment.block.arena[id].kind else {
                continue;
            };
            engine.checkpoint()?;
            let artifact =
                caches.plots.get_or_compute(spec.fingerprint(), segment.identity, revision, || {
                    Ok(Arc::new(caches.plotter.render(spec)))
                })?;
            plots.push(PlotEntry { node: NodeRef::new(segment.identity, id), artifact });
        }
    }

    Ok(Artifacts { plots })
}

pub(crate) fn collect_diagnostics(
    file: FileId,
    parsed: &ParsedSource,
    evaluated: &EvaluatedFile,
    tree: &DocumentTree,
    pages: &Pages,
) -> Vec<Diagnostic> {
    let content = &*parsed.text;
    let context = DiagnosticsContext::new(file, content).with_tree(tree);
    let mut collector = Collector::new(parsed.version);

    for error in parsed.parsed.1.iter() {
        collector.extend(error.to_diagnostics(&context));
    }

    for entry in &evaluated.document.blocks {
        let context = DiagnosticsContext::new(file, content).with_offset(entry.range.start());
        for error in &entry.block.errors {
            collector.extend(error.to_diagnostics(&context));
        }
    }

    for error in tree.errors() {
        collector.extend(error.to_diagnostics(&context));
    }

    for warning in pages.warnings() {
        collector.extend(warning.to_diagnostics(&context));
    }

    for cycle in &evaluated.refused {
        let span = evaluated
            .document
            .blocks
            .iter()
            .find(|entry| entry.block.identity == cycle.consumer)
            .map(|entry| Span::from(entry.range))
            .unwrap_or_default();
        let diagnostic = Diagnostic::error(
            DiagnosticKind::Internal,
            "DependencyCycle",
            cycle.to_string(),
            file,
            span,
        );
        collector.push(diagnostic);
    }

    collector.finish()
}
