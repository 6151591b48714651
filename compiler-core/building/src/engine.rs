//! Implements the core build system for the incremental document compiler
//!
//! Our implementation is inspired by the verifying step traces described in
//! the [Build systems à la carte: Theory and practice] paper. However, the
//! implementation has two key differences: we only retain the latest step
//! trace for any given query; and more significantly, we use structural
//! equality instead of hashing to compare cached and fresh values.
//!
//! Queries are per document: the source version is an input, and parsing,
//! include resolution, evaluation, layout, plotting and diagnostics are
//! derived from it. Work below the granularity of a document, evaluated
//! blocks, block layouts and plot artifacts, is shared through the
//! fingerprint-keyed [`Memo`] caches instead.
//!
//! The build system is designed to be pure and hermetic. The current state
//! of the workspace, e.g. document versions, is stored in-memory to make
//! dependency tracking easier to manage.
//!
//! Our implementation also borrows a few techniques used by [salsa] such as
//! using global query lock for ordering query reads and input writes, and
//! future-promise-based work deduplication. These techniques enable parallel
//! computation with cancellation and work deduplication!
//!
//! [Build systems à la carte: Theory and practice]: https://www.cambridge.org/core/journals/journal-of-functional-programming/article/build-systems-a-la-carte-theory-and-practice/097CE52C750E69BD16B78C318754C7A4
//! [salsa]: https://github.com/salsa-rs/salsa

mod graph;

use std::{
    cell::RefCell,
    collections::hash_map::Entry,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
};

use building_types::{IncludeNameId, IncludeNameInterner, QueryError, QueryKey, QueryResult};
use diagnostics::Diagnostic;
use evaluating::{DocumentTree, EvaluatedBlock, Include, Includes};
use files::{FileId, SourceVersion};
use graph::WaitGraph;
use indexmap::IndexSet;
use layout::{BlockLayout, LayoutConfig, Metrics, MonoMetrics, Pages};
use parking_lot::lock_api::{RawRwLock, RawRwLockRecursive};
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use thread_local::ThreadLocal;

use crate::memo::{Memo, Pin, Pins};
use crate::pipeline::{self, Compiled, EvaluatedFile, IncludeTarget, ParsedSource};
use crate::plot::{Artifacts, PlotArtifact, Plotter, SummaryPlotter};
use crate::promise::{Future, Promise};

#[derive(Debug, Clone, Copy)]
struct Trace {
    /// Timestamp of when the query was last called.
    built: usize,
    /// Timestamp of when the query was last recomputed.
    changed: usize,
}

#[derive(Debug, Default)]
enum DerivedState<T> {
    #[default]
    NotComputed,
    InProgress {
        id: SnapshotId,
        promises: Mutex<Vec<Promise<T>>>,
    },
    Computed {
        computed: T,
        trace: Trace,
        dependencies: Arc<[QueryKey]>,
    },
}

impl<T> DerivedState<T> {
    fn in_progress(id: SnapshotId) -> DerivedState<T> {
        DerivedState::InProgress { id, promises: Mutex::default() }
    }
}

#[derive(Debug)]
struct InputState<T> {
    value: T,
    changed: usize,
}

#[derive(Default)]
struct InputStorage {
    content: FxHashMap<FileId, InputState<SourceVersion>>,
    include: FxHashMap<IncludeNameId, InputState<FileId>>,
    config: Option<InputState<LayoutConfig>>,
}

#[derive(Default)]
struct DerivedStorage {
    parsed: FxHashMap<FileId, DerivedState<Arc<ParsedSource>>>,
    include_targets: FxHashMap<FileId, DerivedState<Arc<[IncludeTarget]>>>,
    includes: FxHashMap<FileId, DerivedState<Arc<Includes>>>,
    evaluated: FxHashMap<FileId, DerivedState<Arc<EvaluatedFile>>>,
    document: FxHashMap<FileId, DerivedState<Arc<DocumentTree>>>,
    laid_out: FxHashMap<FileId, DerivedState<Arc<Pages>>>,
    artifacts: FxHashMap<FileId, DerivedState<Arc<Artifacts>>>,
    diagnostics: FxHashMap<FileId, DerivedState<Arc<[Diagnostic]>>>,
    compiled: FxHashMap<FileId, DerivedState<Compiled>>,
}

#[derive(Default)]
struct InternedStorage {
    include: IncludeNameInterner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SnapshotId(u32);

#[derive(Default)]
struct GlobalState {
    /// An atomic token that determines if query execution had been cancelled.
    cancelled: AtomicBool,
    /// A global read-write lock for enforcing the order of reads and writes.
    query_lock: RwLock<()>,
    /// A counter that tracks the current revision of the query engine.
    revision: AtomicUsize,
    /// A counter that tracks the next [`SnapshotId`],
    snapshot: AtomicU32,
    /// A graph that tracks which [`SnapshotId`] waits on which.
    graph: Mutex<WaitGraph>,
}

impl GlobalState {
    fn next_snapshot(&self) -> SnapshotId {
        SnapshotId(self.snapshot.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
struct LocalState {
    inner: ThreadLocal<RefCell<LocalStateInner>>,
}

impl LocalState {
    fn with_current<T>(&self, current: QueryKey, f: impl FnOnce() -> T) -> T {
        let inner = self.inner.get_or_default();
        {
            let mut setup = inner.borrow_mut();
            setup.stack.push(current);
        }
        let result = f();
        {
            let mut cleanup = inner.borrow_mut();
            cleanup.stack.pop();
            cleanup.in_progress.remove(&current);
            cleanup.dependencies.remove(&current);
        }
        result
    }

    fn with_dependency(&self, dependency: QueryKey) {
        let mut inner = self.inner.get_or_default().borrow_mut();
        if let Some(&current) = inner.stack.last() {
            inner.dependencies.entry(current).or_default().insert(dependency);
        }
    }

    /// Dependencies of `key`, in the order they were first read.
    fn dependencies(&self, key: QueryKey) -> Arc<[QueryKey]> {
        let inner = &self.inner.get_or_default().borrow();
        match inner.dependencies.get(&key) {
            Some(dependencies) => dependencies.iter().copied().collect(),
            None => Arc::from([]),
        }
    }

    fn stack(&self) -> Arc<[QueryKey]> {
        let inner = self.inner.get_or_default().borrow();
        inner.stack.as_slice().into()
    }

    fn add_in_progress(&self, key: QueryKey) {
        let mut inner = self.inner.get_or_default().borrow_mut();
        inner.in_progress.insert(key);
    }

    fn is_in_progress(&self, key: QueryKey) -> bool {
        let inner = self.inner.get_or_default().borrow();
        inner.in_progress.contains(&key)
    }
}

#[derive(Debug, Default)]
struct LocalStateInner {
    stack: Vec<QueryKey>,
    in_progress: FxHashSet<QueryKey>,
    dependencies: FxHashMap<QueryKey, IndexSet<QueryKey, FxBuildHasher>>,
}

/// Custom guard that acquires a read lock from the [`GlobalState::query_lock`]
/// and releases it when dropped, effectively tying it to the lifetime of the
/// [`QueryControl`] it belongs to.
struct QueryControlGuard {
    global: Arc<GlobalState>,
}

impl QueryControlGuard {
    fn new(global: &Arc<GlobalState>) -> QueryControlGuard {
        // SAFETY: QueryControlGuard::drop
        unsafe { global.query_lock.raw().lock_shared_recursive() };
        QueryControlGuard { global: Arc::clone(global) }
    }
}

impl Drop for QueryControlGuard {
    fn drop(&mut self) {
        // SAFETY: QueryControlGuard::new
        unsafe { self.global.query_lock.raw().unlock_shared() }
    }
}

struct QueryControl {
    _guard: Option<QueryControlGuard>,
    id: SnapshotId,
    local: Arc<LocalState>,
    global: Arc<GlobalState>,
}

impl QueryControl {
    fn snapshot(&self) -> QueryControl {
        let _guard = Some(QueryControlGuard::new(&self.global));
        let local = Arc::new(LocalState::default());
        let global = Arc::clone(&self.global);
        let id = global.next_snapshot();
        QueryControl { _guard, id, local, global }
    }
}

impl Default for QueryControl {
    fn default() -> QueryControl {
        let _guard = None;
        let local = Arc::new(LocalState::default());
        let global = Arc::new(GlobalState::default());
        let id = global.next_snapshot();
        QueryControl { _guard, id, local, global }
    }
}

#[derive(Default)]
struct QueryStorage {
    input: InputStorage,
    derived: DerivedStorage,
    interned: InternedStorage,
}

/// Settings fixed for the lifetime of a [`QueryEngine`].
#[derive(Clone)]
pub struct EngineConfig {
    /// Maximum number of entries kept by each memo.
    pub cache_capacity: usize,
    pub metrics: Arc<dyn Metrics>,
    pub plotter: Arc<dyn Plotter>,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            cache_capacity: 4096,
            metrics: Arc::new(MonoMetrics::default()),
            plotter: Arc::new(SummaryPlotter),
        }
    }
}

/// Fingerprint-keyed caches shared by every snapshot of an engine.
pub(crate) struct Caches {
    pub(crate) pins: Pins,
    pub(crate) blocks: Memo<Arc<EvaluatedBlock>>,
    pub(crate) layouts: Memo<Arc<BlockLayout>>,
    pub(crate) plots: Memo<Arc<PlotArtifact>>,
    pub(crate) metrics: Arc<dyn Metrics>,
    pub(crate) plotter: Arc<dyn Plotter>,
}

impl Caches {
    fn new(config: EngineConfig) -> Caches {
        let pins = Pins::default();
        let capacity = config.cache_capacity;
        Caches {
            blocks: Memo::new("blocks", capacity, pins.clone()),
            layouts: Memo::new("layouts", capacity, pins.clone()),
            plots: Memo::new("plots", capacity, pins.clone()),
            pins,
            metrics: config.metrics,
            plotter: config.plotter,
        }
    }
}

/// Number of entries held by each memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub blocks: usize,
    pub layouts: usize,
    pub plots: usize,
}

pub struct QueryEngine {
    storage: Arc<RwLock<QueryStorage>>,
    control: QueryControl,
    caches: Arc<Caches>,
}

impl Default for QueryEngine {
    fn default() -> QueryEngine {
        QueryEngine::new(EngineConfig::default())
    }
}

impl QueryEngine {
    pub fn new(config: EngineConfig) -> QueryEngine {
        let storage = Arc::default();
        let control = QueryControl::default();
        let caches = Arc::new(Caches::new(config));
        QueryEngine { storage, control, caches }
    }

    /// Creates a snapshot of the [`QueryEngine`].
    ///
    /// Snapshots are read locks over the [`QueryEngine`] that must
    /// be sent across threads to perform query execution.
    ///
    /// As with read locks, keeping snapshots alive indefinitely is
    /// a logic error and will cause a deadlock on mutation or on a
    /// [cancellation request].
    ///
    /// [cancellation request]: QueryEngine::request_cancel
    pub fn snapshot(&self) -> QueryEngine {
        let storage = self.storage.clone();
        let control = self.control.snapshot();
        let caches = Arc::clone(&self.caches);
        QueryEngine { storage, control, caches }
    }

    /// Creates a cancellation request for queries.
    ///
    /// Query cancellation is cooperative. A cancellation flag is read
    /// at some point during query execution. This function also waits
    /// for all snapshots to be dropped, as in the expected consequence
    /// of cancelling all queries running across all threads.
    pub fn request_cancel(&self) {
        self.control.global.cancelled.store(true, Ordering::Relaxed);
        let _query_lock = self.control.global.query_lock.write();
        self.control.global.cancelled.store(false, Ordering::Relaxed);
    }

    /// Fails with [`QueryError::Cancelled`] once cancellation was requested.
    ///
    /// Long computations call this between units of work.
    pub fn checkpoint(&self) -> QueryResult<()> {
        if self.control.global.cancelled.load(Ordering::Relaxed) {
            return Err(QueryError::Cancelled);
        }
        Ok(())
    }

    pub fn revision(&self) -> usize {
        self.control.global.revision.load(Ordering::Relaxed)
    }

    /// Keeps memo entries used at the current revision from being evicted
    /// until the returned guard is dropped.
    pub fn pin(&self) -> Pin {
        self.caches.pins.pin(self.revision())
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            blocks: self.caches.blocks.len(),
            layouts: self.caches.layouts.len(),
            plots: self.caches.plots.len(),
        }
    }

    pub(crate) fn caches(&self) -> &Caches {
        &self.caches
    }
}

impl QueryEngine {
    fn query<K, V, GetFn, GetMutFn, ComputeFn>(
        &self,
        key: QueryKey,
        get: GetFn,
        get_mut: GetMutFn,
        compute: ComputeFn,
    ) -> QueryResult<V>
    where
        GetFn: Fn(&QueryStorage) -> Option<&DerivedState<V>>,
        GetMutFn: Fn(&mut QueryStorage) -> Entry<K, DerivedState<V>>,
        ComputeFn: Fn(&QueryEngine, Option<&V>) -> QueryResult<V>,
        V: Eq + Clone,
    {
        self.control.local.with_dependency(key);
        self.control.local.with_current(key, || {
            // If query execution fails at any given point, clean up the state.
            self.query_core(key, &get, &get_mut, &compute).inspect_err(|error| {
                tracing::debug!(target: "building::engine", ?key, %error, "failed");
                if self.control.local.is_in_progress(key) {
                    let mut storage = self.storage.write();
                    if let Entry::Occupied(o) = get_mut(&mut storage) {
                        if let DerivedState::InProgress { id, promises } = o.remove() {
                            let mut graph = self.control.global.graph.lock();
                            drop(promises);
                            drop(storage);
                            graph.release(id);
                        } else {
                            unreachable!("invariant violated: expected InProgress");
                        }
                    }
                }
            })
        })
    }

    /// Fulfills the promises of an [`DerivedState::InProgress`] query and
    /// replaces it with a [`DerivedState::Computed`] result in the store.
    fn fulfill_and_store<K, V, GetMutFn>(
        &self,
        get_mut: &GetMutFn,
        computed: V,
        trace: Trace,
        dependencies: Arc<[QueryKey]>,
    ) where
        GetMutFn: Fn(&mut QueryStorage) -> Entry<K, DerivedState<V>>,
        V: Clone,
    {
        let mut storage = self.storage.write();
        if let Entry::Occupied(o) = get_mut(&mut storage) {
            if let DerivedState::InProgress { id, promises } = o.remove() {
                let mut graph = self.control.global.graph.lock();
                let promises = promises.into_inner();
                promises.into_iter().for_each(|promise| {
                    let computed = V::clone(&computed);
                    promise.fulfill(computed);
                });
                graph.release(id);
            } else {
                unreachable!("invariant violated: expected InProgress");
            }
        }

        let state = DerivedState::Computed { computed, trace, dependencies };
        get_mut(&mut storage).insert_entry(state);
    }

    fn compute_core<K, V, GetMutFn, ComputeFn>(
        &self,
        get_mut: &GetMutFn,
        compute: &ComputeFn,
        key: QueryKey,
        revision: usize,
        previous: Option<(V, Trace)>,
    ) -> QueryResult<V>
    where
        GetMutFn: Fn(&mut QueryStorage) -> Entry<K, DerivedState<V>>,
        ComputeFn: Fn(&QueryEngine, Option<&V>) -> QueryResult<V>,
        V: Eq + Clone,
    {
        self.checkpoint()?;

        tracing::debug!(target: "building::engine", ?key, revision, "compute");
        let computed = compute(self, previous.as_ref().map(|(previous, _)| previous))?;

        // If the computed result is equal to the cached one, the changed
        // timestamp does not need to be updated. Likewise, we also insert
        // the previous value back into the cache. The latter is a niche,
        // but useful optimisation for when V = Arc<T>, since it enables
        // pointer equality.
        match previous {
            Some((previous, trace)) if computed == previous => {
                tracing::trace!(target: "building::engine", ?key, "unchanged");
                let trace = Trace { built: revision, changed: trace.changed };
                let dependencies = self.control.local.dependencies(key);
                self.fulfill_and_store(get_mut, V::clone(&previous), trace, dependencies);
                Ok(previous)
            }
            _ => {
                let trace = Trace { built: revision, changed: revision };
                let dependencies = self.control.local.dependencies(key);
                self.fulfill_and_store(get_mut, V::clone(&computed), trace, dependencies);
                Ok(computed)
            }
        }
    }

    /// Verifies the given dependencies by executing them, returning the
    /// timestamp of the most latest change.
    fn verify_core(&self, dependencies: &[QueryKey]) -> QueryResult<usize> {
        let mut latest = 0;

        macro_rules! input_changed {
            ($field:ident, $key:expr) => {{
                let storage = self.storage.read();
                if let Some(InputState { changed, .. }) = storage.input.$field.get($key) {
                    latest = latest.max(*changed);
                }
            }};
        }

        macro_rules! derived_changed {
            ($field:ident, $key:expr) => {{
                self.$field(*$key)?;
                let storage = self.storage.read();
                if let Some(DerivedState::Computed { trace, .. }) = storage.derived.$field.get($key)
                {
                    latest = latest.max(trace.changed);
                }
            }};
        }

        for dependency in dependencies {
            match dependency {
                QueryKey::Content(k) => input_changed!(content, k),
                QueryKey::IncludeTarget(k) => input_changed!(include, k),
                QueryKey::Config => {
                    let storage = self.storage.read();
                    if let Some(InputState { changed, .. }) = &storage.input.config {
                        latest = latest.max(*changed);
                    }
                }
                QueryKey::Parsed(k) => derived_changed!(parsed, k),
                QueryKey::IncludeTargets(k) => derived_changed!(include_targets, k),
                QueryKey::Includes(k) => derived_changed!(includes, k),
                QueryKey::Evaluated(k) => derived_changed!(evaluated, k),
                QueryKey::Document(k) => derived_changed!(document, k),
                QueryKey::LaidOut(k) => derived_changed!(laid_out, k),
                QueryKey::Artifacts(k) => derived_changed!(artifacts, k),
                QueryKey::Diagnostics(k) => derived_changed!(diagnostics, k),
                QueryKey::Compiled(k) => derived_changed!(compiled, k),
            }
        }

        Ok(latest)
    }

    fn create_future<T>(
        &self,
        to_id: SnapshotId,
        promises: &Mutex<Vec<Promise<T>>>,
    ) -> QueryResult<Future<T>> {
        {
            let mut graph = self.control.global.graph.lock();
            let stack = self.control.local.stack();
            if !graph.wait(self.control.id, to_id) {
                return Err(QueryError::Cycle { stack });
            }
        }

        let (future, promise) = Future::new();
        promises.lock().push(promise);
        Ok(future)
    }

    fn query_core<K, V, GetFn, GetMutFn, ComputeFn>(
        &self,
        key: QueryKey,
        get: &GetFn,
        get_mut: &GetMutFn,
        compute: &ComputeFn,
    ) -> QueryResult<V>
    where
        GetFn: Fn(&QueryStorage) -> Option<&DerivedState<V>>,
        GetMutFn: Fn(&mut QueryStorage) -> Entry<K, DerivedState<V>>,
        ComputeFn: Fn(&QueryEngine, Option<&V>) -> QueryResult<V>,
        V: Eq + Clone,
    {
        self.checkpoint()?;

        let revision = self.revision();

        // Certain query states can be checked with only a read lock, and this
        // is an extremely useful optimisation because it allows threads to
        // skip their turn on acquiring an upgradable read lock.
        //
        // For computed queries, we can skip dependency verification if the
        // cached value was built during the current revision.
        //
        // For in-progress queries, we can simply push to the internally mutable
        // vector of promises and then wait on the future.
        {
            let storage = self.storage.read();
            match get(&storage).unwrap_or(&DerivedState::NotComputed) {
                DerivedState::Computed { computed, trace, .. } => {
                    if trace.built == revision {
                        return Ok(V::clone(computed));
                    }
                }
                DerivedState::InProgress { id, promises } => {
                    let future = self.create_future(*id, promises)?;

                    // Remember that Future::wait blocks the current thread!
                    drop(storage);

                    return future.wait().ok_or(QueryError::Cancelled);
                }
                _ => (),
            }
        }

        // Otherwise, we will have to perform computation or cache verification.
        // Instead of a write lock, we use an upgradable read lock for two reasons:
        // we want to ensure that only a single thread can observe the NotComputed
        // state for any given query while allowing read locks to be acquired for
        // the optimisation above.
        {
            let storage = self.storage.upgradable_read();
            match get(&storage).unwrap_or(&DerivedState::NotComputed) {
                DerivedState::NotComputed => {
                    // At the end of this block, threads waiting to acquire the
                    // upgradable read lock should read that the query is InProgress.
                    {
                        let mut storage = RwLockUpgradableReadGuard::upgrade(storage);
                        get_mut(&mut storage)
                            .insert_entry(DerivedState::in_progress(self.control.id));
                        self.control.local.add_in_progress(key);
                    }

                    self.compute_core(get_mut, compute, key, revision, None)
                }
                DerivedState::InProgress { id, promises } => {
                    let future = self.create_future(*id, promises)?;

                    // Remember that Future::wait blocks the current thread!
                    drop(storage);

                    future.wait().ok_or(QueryError::Cancelled)
                }
                DerivedState::Computed { computed, trace, dependencies } => {
                    let computed = V::clone(computed);
                    let trace = *trace;
                    let dependencies = Arc::clone(dependencies);

                    // If the cached value was built during the current revision
                    // we can skip dependency verification entirely. This is also
                    // checked at the start of the query_core with a read lock.
                    if trace.built == revision {
                        return Ok(computed);
                    }

                    // Same as NotComputed, see comment above.
                    {
                        let mut storage = RwLockUpgradableReadGuard::upgrade(storage);
                        get_mut(&mut storage)
                            .insert_entry(DerivedState::in_progress(self.control.id));
                        self.control.local.add_in_progress(key);
                    }

                    let latest = self.verify_core(&dependencies)?;

                    // If the cached value was built more recently the the
                    // latest change, we can update its built timestamp to
                    // the current revision. This allows the query to hit
                    // the fastest path if it's called in the same revision.
                    if trace.built >= latest {
                        tracing::trace!(target: "building::engine", ?key, revision, "verified");
                        let trace = Trace { built: revision, ..trace };
                        self.fulfill_and_store(get_mut, V::clone(&computed), trace, dependencies);
                        return Ok(computed);
                    }

                    self.compute_core(get_mut, compute, key, revision, Some((computed, trace)))
                }
            }
        }
    }

    fn set_input<V, F>(&self, f: F, value: V)
    where
        F: FnOnce(&mut QueryStorage, InputState<V>),
    {
        self.control.global.cancelled.store(true, Ordering::Relaxed);
        let _query_lock = self.control.global.query_lock.write();

        let changed = self.control.global.revision.fetch_add(1, Ordering::Relaxed);
        let state = InputState { value, changed: changed + 1 };

        let mut storage = self.storage.write();
        f(&mut storage, state);

        self.control.global.cancelled.store(false, Ordering::Relaxed);
    }

    fn get_input<V, F>(&self, k: QueryKey, f: F) -> Option<V>
    where
        F: FnOnce(&QueryStorage) -> Option<&InputState<V>>,
        V: Clone,
    {
        self.control.local.with_dependency(k);
        let storage = self.storage.read();
        f(&storage).map(|state| V::clone(&state.value))
    }
}

impl QueryEngine {
    pub fn set_content(&self, id: FileId, source: SourceVersion) {
        tracing::debug!(target: "building::engine", ?id, version = source.version, "set_content");
        self.set_input(
            |storage, state| {
                storage.input.content.insert(id, state);
            },
            source,
        );
    }

    pub fn content(&self, id: FileId) -> SourceVersion {
        self.get_input(QueryKey::Content(id), |storage| storage.input.content.get(&id))
            .unwrap_or_else(|| {
                panic!("invariant violated: set_content({id:?}, ..)");
            })
    }

    /// The version last set for `id`, without depending on it.
    pub fn content_version(&self, id: FileId) -> Option<u32> {
        let storage = self.storage.read();
        storage.input.content.get(&id).map(|state| state.value.version)
    }

    pub fn set_include_target(&self, name: &str, file: FileId) {
        let id = {
            let mut storage = self.storage.write();
            storage.interned.include.intern(name)
        };
        self.set_input(
            |storage, state| {
                storage.input.include.insert(id, state);
            },
            file,
        );
    }

    /// The file an include name refers to.
    ///
    /// Unknown names are interned so that the dependency on them is
    /// recorded; setting the name later invalidates the caller.
    pub fn include_target(&self, name: &str) -> Option<FileId> {
        let interned = self.storage.read().interned.include.lookup(name);
        let id = match interned {
            Some(id) => id,
            None => self.storage.write().interned.include.intern(name),
        };
        self.get_input(QueryKey::IncludeTarget(id), |storage| storage.input.include.get(&id))
    }

    pub fn set_config(&self, config: LayoutConfig) {
        self.set_input(
            |storage, state| {
                storage.input.config = Some(state);
            },
            config,
        );
    }

    pub fn config(&self) -> LayoutConfig {
        self.get_input(QueryKey::Config, |storage| storage.input.config.as_ref())
            .unwrap_or_default()
    }

    pub fn parsed(&self, id: FileId) -> QueryResult<Arc<ParsedSource>> {
        self.query(
            QueryKey::Parsed(id),
            |storage| storage.derived.parsed.get(&id),
            |storage| storage.derived.parsed.entry(id),
            |this, previous| {
                let source = this.content(id);
                let parsed = pipeline::parse(previous.map(Arc::as_ref), &source);
                Ok(Arc::new(parsed))
            },
        )
    }

    pub fn include_targets(&self, id: FileId) -> QueryResult<Arc<[IncludeTarget]>> {
        self.query(
            QueryKey::IncludeTargets(id),
            |storage| storage.derived.include_targets.get(&id),
            |storage| storage.derived.include_targets.entry(id),
            |this, _| {
                let parsed = this.parsed(id)?;
                let names = pipeline::include_names(&parsed.syntax_node());
                let targets = names.into_iter().map(|name| {
                    let file = this.include_target(&name);
                    IncludeTarget { name, file }
                });
                Ok(targets.collect())
            },
        )
    }

    pub fn includes(&self, id: FileId) -> QueryResult<Arc<Includes>> {
        self.query(
            QueryKey::Includes(id),
            |storage| storage.derived.includes.get(&id),
            |storage| storage.derived.includes.entry(id),
            |this, _| {
                let targets = this.include_targets(id)?;
                let mut includes = Includes::default();
                for target in targets.iter() {
                    let include = match target.file {
                        None => Include::Missing,
                        Some(file) if this.reaches(file, id)? => Include::Cycle,
                        Some(file) => Include::Resolved(Arc::clone(&this.evaluated(file)?.document)),
                    };
                    includes.insert(target.name.clone(), include);
                }
                Ok(Arc::new(includes))
            },
        )
    }

    pub fn evaluated(&self, id: FileId) -> QueryResult<Arc<EvaluatedFile>> {
        self.query(
            QueryKey::Evaluated(id),
            |storage| storage.derived.evaluated.get(&id),
            |storage| storage.derived.evaluated.entry(id),
            |this, previous| {
                let parsed = this.parsed(id)?;
                let includes = this.includes(id)?;
                let previous = previous.map(Arc::as_ref);
                let evaluated = pipeline::evaluate(this, id, &parsed, &includes, previous)?;
                Ok(Arc::new(evaluated))
            },
        )
    }

    pub fn document(&self, id: FileId) -> QueryResult<Arc<DocumentTree>> {
        self.query(
            QueryKey::Document(id),
            |storage| storage.derived.document.get(&id),
            |storage| storage.derived.document.entry(id),
            |this, _| {
                let evaluated = this.evaluated(id)?;
                Ok(Arc::new(evaluating::assemble(&evaluated.document)))
            },
        )
    }

    pub fn laid_out(&self, id: FileId) -> QueryResult<Arc<Pages>> {
        self.query(
            QueryKey::LaidOut(id),
            |storage| storage.derived.laid_out.get(&id),
            |storage| storage.derived.laid_out.entry(id),
            |this, previous| {
                let tree = this.document(id)?;
                let config = this.config();
                let pages = pipeline::lay_out(this, &tree, &config, previous.map(Arc::as_ref))?;
                Ok(Arc::new(pages))
            },
        )
    }

    pub fn artifacts(&self, id: FileId) -> QueryResult<Arc<Artifacts>> {
        self.query(
            QueryKey::Artifacts(id),
            |storage| storage.derived.artifacts.get(&id),
            |storage| storage.derived.artifacts.entry(id),
            |this, _| {
                let tree = this.document(id)?;
                Ok(Arc::new(pipeline::render_plots(this, &tree)?))
            },
        )
    }

    pub fn diagnostics(&self, id: FileId) -> QueryResult<Arc<[Diagnostic]>> {
        self.query(
            QueryKey::Diagnostics(id),
            |storage| storage.derived.diagnostics.get(&id),
            |storage| storage.derived.diagnostics.entry(id),
            |this, _| {
                let parsed = this.parsed(id)?;
                let evaluated = this.evaluated(id)?;
                let tree = this.document(id)?;
                let pages = this.laid_out(id)?;
                let diagnostics =
                    pipeline::collect_diagnostics(id, &parsed, &evaluated, &tree, &pages);
                Ok(diagnostics.into())
            },
        )
    }

    pub fn compiled(&self, id: FileId) -> QueryResult<Compiled> {
        self.query(
            QueryKey::Compiled(id),
            |storage| storage.derived.compiled.get(&id),
            |storage| storage.derived.compiled.entry(id),
            |this, _| {
                let parsed = this.parsed(id)?;
                Ok(Compiled {
                    file: id,
                    version: parsed.version,
                    document: this.document(id)?,
                    pages: this.laid_out(id)?,
                    artifacts: this.artifacts(id)?,
                    diagnostics: this.diagnostics(id)?,
                })
            },
        )
    }

    /// Whether following includes from `from` leads to `to`.
    fn reaches(&self, from: FileId, to: FileId) -> QueryResult<bool> {
        let mut visited = FxHashSet::default();
        let mut worklist = vec![from];
        while let Some(file) = worklist.pop() {
            if file == to {
                return Ok(true);
            }
            if !visited.insert(file) {
                continue;
            }
            let targets = self.include_targets(file)?;
            worklist.extend(targets.iter().filter_map(|target| target.file));
        }
        Ok(false)
    }
}
