//! Evaluation of parsed blocks into the document model.
//!
//! Each top-level block is evaluated on its own against the module scope
//! formed by the blocks before it, producing an [`EvaluatedBlock`]. Blocks
//! are then collected into an [`EvaluatedDocument`], and the documents of a
//! compilation are assembled into a [`DocumentTree`] with numbering and
//! resolved references.

mod algorithm;
mod builtins;
mod document;
mod environment;
mod error;
mod model;
mod names;

use std::sync::Arc;

pub use builtins::*;
pub use document::*;
pub use environment::*;
pub use error::*;
pub use model::*;
pub use names::*;

use building_types::{Fingerprint, NodeIdentity};
use files::FileId;
use indexmap::IndexMap;
use rowan::TextRange;
use rustc_hash::{FxBuildHasher, FxHashMap};
use smol_str::SmolStr;
use syntax::SyntaxNode;

/// Identifies the block being evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockContext {
    pub identity: NodeIdentity,
    /// The evaluation key, see [`NameClosure::key`].
    pub key: Fingerprint,
}

/// The outcome of resolving an `\include{name}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Include {
    Resolved(Arc<EvaluatedDocument>),
    Missing,
    Cycle,
}

impl Include {
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            Include::Resolved(document) => document.fingerprint,
            Include::Missing => Fingerprint::of("missing"),
            Include::Cycle => Fingerprint::of("cycle"),
        }
    }
}

pub type Includes = FxHashMap<SmolStr, Include>;

/// A use of a macro binding during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub name: SmolStr,
    pub span: TextRange,
    pub origin: Option<Origin>,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub key: SmolStr,
    pub node: DocNodeId,
    /// The innermost figure enclosing the label.
    pub figure: Option<DocNodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedBlock {
    pub identity: NodeIdentity,
    pub fingerprint: Fingerprint,
    pub arena: DocumentArena,
    pub roots: Vec<DocNodeId>,
    pub errors: Vec<EvaluationError>,
    /// Macros defined at the top level of the block, visible to later blocks.
    pub exports: Vec<Arc<Macro>>,
    pub reads: Vec<Read>,
    pub labels: Vec<Label>,
    pub references: Vec<DocNodeId>,
    /// Documents spliced in by [`NodeKind::Include`] nodes.
    pub includes: Vec<Arc<EvaluatedDocument>>,
    pub plots: Vec<DocNodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// The range of the block within its file.
    pub range: TextRange,
    pub block: Arc<EvaluatedBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedDocument {
    pub file: FileId,
    pub blocks: Vec<BlockEntry>,
    pub exports: Vec<Arc<Macro>>,
    pub fingerprint: Fingerprint,
}

impl EvaluatedDocument {
    pub fn new(file: FileId, blocks: Vec<BlockEntry>) -> EvaluatedDocument {
        let mut exports = IndexMap::<SmolStr, Arc<Macro>, FxBuildHasher>::default();
        for entry in &blocks {
            for definition in &entry.block.exports {
                exports.insert(definition.name.clone(), Arc::clone(definition));
            }
        }
        let exports = exports.into_values().collect();

        let fingerprints = blocks.iter().map(|entry| {
            let range = (u32::from(entry.range.start()), u32::from(entry.range.end()));
            entry.block.fingerprint.combine(Fingerprint::of(&range))
        });
        let fingerprint = Fingerprint::of(&file).combine(Fingerprint::combine_all(fingerprints));

        EvaluatedDocument { file, blocks, exports, fingerprint }
    }
}

/// Top-level blocks of a document with their identities.
///
/// Blocks with the same content are told apart by counting earlier
/// occurrences of that content.
pub fn block_identities(file: FileId, root: &SyntaxNode) -> Vec<(NodeIdentity, SyntaxNode)> {
    let mut occurrences = FxHashMap::<Fingerprint, u32>::default();
    root.children()
        .filter(syntax::cst::is_block)
        .map(|block| {
            let fingerprint = Fingerprint::of(&block.green().into_owned());
            let occurrence = occurrences.entry(fingerprint).or_default();
            let identity = NodeIdentity::new(file, fingerprint, *occurrence);
            *occurrence += 1;
            (identity, block)
        })
        .collect()
}

pub fn evaluate_block(
    context: &BlockContext,
    block: &SyntaxNode,
    module: &Environment<'_>,
    includes: &Includes,
) -> EvaluatedBlock {
    algorithm::evaluate_block(context, block, module, includes)
}

/// Evaluates every block of a document in order, without caching.
pub fn evaluate_document(file: FileId, root: &SyntaxNode, includes: &Includes) -> EvaluatedDocument {
    let global = Environment::global();
    let mut module = Environment::module(&global);
    let mut blocks = vec![];

    for (identity, block) in block_identities(file, root) {
        let closure = name_closure(&block, &module, includes);
        let key = closure.key(identity.fingerprint, includes);
        let context = BlockContext { identity, key };
        let evaluated = evaluate_block(&context, &block, &module, includes);
        module.extend(evaluated.exports.iter().cloned());
        blocks.push(BlockEntry { range: block.text_range(), block: Arc::new(evaluated) });
    }

    EvaluatedDocument::new(file, blocks)
}
