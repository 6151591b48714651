//! Documents under compilation, and sessions that compile them in the
//! background.
//!
//! A [`Workspace`] owns the [`SourceStore`] and the [`QueryEngine`], and
//! keeps the engine's inputs in sync with the store. A [`Session`] adds
//! versioned background compilation on top: every request runs on its own
//! engine snapshot, and results that were overtaken by a newer request or
//! delivery are dropped on the receiving side.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use building_types::QueryError;
use diagnostics::{DiagnosticsContext, ToDiagnostics};
use evaluating::EvaluatedDocument;
use files::{EditError, FileId, SourceStore, SourceVersion};
use layout::LayoutConfig;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::{Artifacts, Compiled, EngineConfig, QueryEngine};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Version {requested} of '{path}' was superseded by version {latest}")]
    Superseded { path: Arc<str>, requested: u32, latest: u32 },
    #[error("Version {requested} of '{path}' does not exist")]
    UnknownVersion { path: Arc<str>, requested: u32 },
    #[error("Compilation was cancelled")]
    Cancelled,
}

/// Loads documents named by `\include` that are not open yet.
pub trait SourceResolver: Send + Sync {
    /// The path and text of the document included as `name`.
    fn resolve(&self, name: &str) -> Option<(String, Arc<str>)>;
}

/// The include name of a document: its file name without the extension.
pub fn include_name(path: &str) -> Option<&str> {
    Path::new(path).file_stem()?.to_str()
}

pub struct Workspace {
    files: SourceStore,
    engine: QueryEngine,
    resolver: Option<Box<dyn SourceResolver>>,
}

impl Default for Workspace {
    fn default() -> Workspace {
        Workspace::new(EngineConfig::default())
    }
}

impl Workspace {
    pub fn new(config: EngineConfig) -> Workspace {
        Workspace { files: SourceStore::default(), engine: QueryEngine::new(config), resolver: None }
    }

    pub fn with_resolver(mut self, resolver: impl SourceResolver + 'static) -> Workspace {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn files(&self) -> &SourceStore {
        &self.files
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Opens a document, or replaces its text if it is already open.
    ///
    /// The document becomes includable under its [`include_name`].
    pub fn open(&mut self, path: &str, text: impl Into<Arc<str>>) -> FileId {
        let file = self.files.insert(path, text);
        self.sync(file);
        if let Some(name) = include_name(path) {
            self.register(name, file);
        }
        file
    }

    pub fn apply_edit(
        &mut self,
        document: FileId,
        range: Range<usize>,
        text: &str,
    ) -> Result<SourceVersion, EditError> {
        let version = self.files.apply_edit(document, range, text)?;
        self.engine.set_content(document, version.clone());
        Ok(version)
    }

    pub fn set_config(&self, config: LayoutConfig) {
        if self.engine.config() != config {
            self.engine.set_config(config);
        }
    }

    /// Compiles `version` of `document`.
    ///
    /// Compiling the same version again returns an equal result without
    /// recomputation. Versions older than the latest one are rejected.
    pub fn compile(&mut self, document: FileId, version: u32) -> Result<Compiled, CompileError> {
        self.check_version(document, version)?;
        self.prepare(document)?;

        let _pin = self.engine.pin();
        compile_snapshot(&self.engine, document, version)
    }

    /// Compiles the latest version of every document in parallel.
    pub fn compile_all(&mut self, documents: &[FileId]) -> Vec<Result<Compiled, CompileError>> {
        for &document in documents {
            if let Err(error) = self.prepare(document) {
                tracing::warn!(target: "building::workspace", ?document, %error, "prepare");
            }
        }

        let _pin = self.engine.pin();
        documents
            .par_iter()
            .map(|&document| {
                let engine = self.engine.snapshot();
                let version = self.files.latest(document).version;
                compile_snapshot(&engine, document, version)
            })
            .collect()
    }

    fn check_version(&self, document: FileId, requested: u32) -> Result<(), CompileError> {
        let latest = self.files.latest(document).version;
        if requested < latest {
            let path = self.files.path(document);
            return Err(CompileError::Superseded { path, requested, latest });
        }
        if requested > latest {
            let path = self.files.path(document);
            return Err(CompileError::UnknownVersion { path, requested });
        }
        Ok(())
    }

    /// Brings in every document reachable through includes that the
    /// engine does not know yet. Runs before a pass, never inside one.
    fn prepare(&mut self, document: FileId) -> Result<(), CompileError> {
        let Some(resolver) = &self.resolver else {
            return Ok(());
        };

        let mut visited = FxHashSet::default();
        let mut worklist = vec![document];
        while let Some(file) = worklist.pop() {
            if !visited.insert(file) {
                continue;
            }
            let targets = self.engine.include_targets(file).map_err(cancelled)?;
            for target in targets.iter() {
                if let Some(file) = target.file {
                    worklist.push(file);
                    continue;
                }
                let Some((path, text)) = resolver.resolve(&target.name) else {
                    tracing::debug!(target: "building::workspace", name = %target.name, "unresolved");
                    continue;
                };
                let included = self.files.insert(&path, text);
                if self.engine.content_version(included) != Some(self.files.latest(included).version) {
                    self.engine.set_content(included, self.files.latest(included));
                }
                self.engine.set_include_target(&target.name, included);
                worklist.push(included);
            }
        }

        Ok(())
    }

    fn sync(&self, file: FileId) {
        let latest = self.files.latest(file);
        if self.engine.content_version(file) != Some(latest.version) {
            self.engine.set_content(file, latest);
        }
    }

    fn register(&self, name: &str, file: FileId) {
        if self.engine.include_target(name) != Some(file) {
            self.engine.set_include_target(name, file);
        }
    }
}

fn cancelled(error: QueryError) -> CompileError {
    tracing::debug!(target: "building::workspace", %error, "prepare");
    CompileError::Cancelled
}

/// Runs the compile query, turning engine failures into results.
///
/// A query cycle is an internal error; it is reported as a diagnostic on an
/// empty document instead of failing the compilation.
fn compile_snapshot(
    engine: &QueryEngine,
    document: FileId,
    version: u32,
) -> Result<Compiled, CompileError> {
    match engine.compiled(document) {
        Ok(compiled) => Ok(compiled),
        Err(QueryError::Cancelled) => {
            tracing::debug!(target: "building::workspace", ?document, version, "cancelled");
            Err(CompileError::Cancelled)
        }
        Err(error @ QueryError::Cycle { .. }) => {
            tracing::error!(target: "building::workspace", ?document, %error, "query cycle");
            let context = DiagnosticsContext::new(document, "");
            let diagnostics = error.to_diagnostics(&context);

            let tree = evaluating::assemble(&EvaluatedDocument::new(document, vec![]));
            let metrics = &*engine.caches().metrics;
            let pages = layout::layout(&tree, &engine.config(), metrics, None);

            Ok(Compiled {
                file: document,
                version,
                document: Arc::new(tree),
                pages: Arc::new(pages),
                artifacts: Arc::new(Artifacts::default()),
                diagnostics: diagnostics.into(),
            })
        }
    }
}

/// A background compilation that did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub file: FileId,
    pub version: u32,
    pub error: CompileError,
}

type Outcome = Result<Compiled, Failure>;

/// Background compilation with versioned delivery.
pub struct Session {
    workspace: Workspace,
    sender: Sender<Outcome>,
    receiver: Receiver<Outcome>,
    requested: FxHashMap<FileId, u32>,
    delivered: FxHashMap<FileId, u32>,
    arrived: Vec<Compiled>,
    failed: Vec<Failure>,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn new(workspace: Workspace) -> Session {
        let (sender, receiver) = mpsc::channel();
        Session {
            workspace,
            sender,
            receiver,
            requested: FxHashMap::default(),
            delivered: FxHashMap::default(),
            arrived: vec![],
            failed: vec![],
            workers: vec![],
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    /// Applies an edit, cancelling compilations that are still running.
    pub fn edit(
        &mut self,
        document: FileId,
        range: Range<usize>,
        text: &str,
    ) -> Result<SourceVersion, EditError> {
        self.workspace.apply_edit(document, range, text)
    }

    /// Starts compiling the latest version of `document` in the background,
    /// returning that version.
    pub fn request(&mut self, document: FileId) -> Result<u32, CompileError> {
        self.workspace.prepare(document)?;

        let version = self.workspace.files.latest(document).version;
        self.requested.insert(document, version);

        let engine = self.workspace.engine.snapshot();
        let sender = self.sender.clone();
        let worker = thread::spawn(move || {
            let pin = engine.pin();
            let result = compile_snapshot(&engine, document, version);
            drop(pin);
            drop(engine);
            let outcome = result.map_err(|error| {
                tracing::debug!(target: "building::workspace", ?document, version, %error);
                Failure { file: document, version, error }
            });
            let _ = sender.send(outcome);
        });

        self.workers.push(worker);
        Ok(version)
    }

    /// Results that arrived since the last call, skipping any that are older
    /// than the newest requested or delivered version of their document.
    pub fn deliveries(&mut self) -> Vec<Compiled> {
        self.receive();
        let mut fresh = vec![];
        for compiled in self.arrived.drain(..) {
            let requested = self.requested.get(&compiled.file).copied().unwrap_or_default();
            let delivered = self.delivered.get(&compiled.file).copied();
            let stale = compiled.version < requested
                || delivered.is_some_and(|delivered| compiled.version <= delivered);
            if stale {
                tracing::debug!(
                    target: "building::workspace",
                    file = ?compiled.file,
                    version = compiled.version,
                    "discarded"
                );
                continue;
            }
            self.delivered.insert(compiled.file, compiled.version);
            fresh.push(compiled);
        }
        fresh
    }

    /// Compilations that failed or were cancelled since the last call.
    pub fn failures(&mut self) -> Vec<Failure> {
        self.receive();
        self.failed.drain(..).collect()
    }

    fn receive(&mut self) {
        for outcome in self.receiver.try_iter() {
            match outcome {
                Ok(compiled) => self.arrived.push(compiled),
                Err(failure) => self.failed.push(failure),
            }
        }
    }

    /// Waits for every background compilation to finish.
    pub fn wait(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!(target: "building::workspace", "worker panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.workspace.engine.request_cancel();
        self.wait();
    }
}
