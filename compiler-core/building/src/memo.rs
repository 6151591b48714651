//! Fingerprint-keyed caches shared between compilations.
//!
//! Where the [`QueryEngine`] caches one value per query key, a [`Memo`]
//! caches one value per content fingerprint: evaluated blocks, block
//! layouts and plot artifacts. Entries are owned by the block that first
//! computed them, and the memo records which blocks read bindings from
//! which, so that dropping a block also drops everything derived from it.
//!
//! Computations are deduplicated per fingerprint. The map lock is only held
//! to find or create a slot; each slot has its own lock, and threads that
//! find a slot in progress wait on a [`Future`] instead of holding it.
//!
//! [`QueryEngine`]: crate::QueryEngine

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use building_types::{Fingerprint, NodeIdentity, QueryError, QueryResult};
use itertools::Itertools;
use parking_lot::Mutex;
use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::promise::{Future, Promise};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[error("Block reads a binding from a block that already depends on it")]
pub struct DependencyCycle {
    pub producer: NodeIdentity,
    pub consumer: NodeIdentity,
}

/// Revisions that still have computations running.
///
/// Entries last used by a pinned revision are never evicted.
#[derive(Debug, Clone, Default)]
pub struct Pins {
    inner: Arc<Mutex<BTreeMap<usize, usize>>>,
}

impl Pins {
    pub fn pin(&self, revision: usize) -> Pin {
        *self.inner.lock().entry(revision).or_default() += 1;
        Pin { pins: self.clone(), revision }
    }

    pub fn oldest(&self) -> Option<usize> {
        self.inner.lock().keys().next().copied()
    }
}

#[must_use]
pub struct Pin {
    pins: Pins,
    revision: usize,
}

impl Drop for Pin {
    fn drop(&mut self) {
        let mut inner = self.pins.inner.lock();
        if let Some(count) = inner.get_mut(&self.revision) {
            *count -= 1;
            if *count == 0 {
                inner.remove(&self.revision);
            }
        }
    }
}

enum SlotState<V> {
    InProgress { promises: Vec<Promise<V>> },
    Computed { value: V, last_used: usize },
    /// The computation failed after waiters found the slot.
    Abandoned,
}

struct Slot<V> {
    owner: NodeIdentity,
    state: Mutex<SlotState<V>>,
}

pub struct Memo<V> {
    name: &'static str,
    capacity: usize,
    pins: Pins,
    slots: Mutex<FxHashMap<Fingerprint, Arc<Slot<V>>>>,
    edges: Mutex<DiGraphMap<NodeIdentity, ()>>,
}

impl<V: Clone> Memo<V> {
    pub fn new(name: &'static str, capacity: usize, pins: Pins) -> Memo<V> {
        let slots = Mutex::default();
        let edges = Mutex::new(DiGraphMap::new());
        Memo { name, capacity, pins, slots, edges }
    }

    /// Returns the value for `fingerprint`, computing it at most once.
    ///
    /// A failed computation leaves no entry behind, and every thread that
    /// was waiting for it observes [`QueryError::Cancelled`].
    pub fn get_or_compute(
        &self,
        fingerprint: Fingerprint,
        owner: NodeIdentity,
        revision: usize,
        compute: impl FnOnce() -> QueryResult<V>,
    ) -> QueryResult<V> {
        let (slot, fresh) = {
            let mut slots = self.slots.lock();
            match slots.get(&fingerprint) {
                Some(slot) => (Arc::clone(slot), false),
                None => {
                    let state = Mutex::new(SlotState::InProgress { promises: vec![] });
                    let slot = Arc::new(Slot { owner, state });
                    slots.insert(fingerprint, Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        if !fresh {
            let mut state = slot.state.lock();
            match &mut *state {
                SlotState::Computed { value, last_used } => {
                    *last_used = revision.max(*last_used);
                    tracing::trace!(target: "building::memo", memo = self.name, ?fingerprint, "hit");
                    return Ok(V::clone(value));
                }
                SlotState::InProgress { promises } => {
                    let (future, promise) = Future::new();
                    promises.push(promise);

                    // Future::wait blocks the current thread.
                    drop(state);

                    tracing::trace!(target: "building::memo", memo = self.name, ?fingerprint, "wait");
                    return future.wait().ok_or(QueryError::Cancelled);
                }
                SlotState::Abandoned => return Err(QueryError::Cancelled),
            }
        }

        let in_flight = InFlight { memo: self, fingerprint, slot: &slot, finished: false };
        let value = compute()?;
        in_flight.finish(V::clone(&value), revision);

        tracing::trace!(target: "building::memo", memo = self.name, ?fingerprint, "computed");
        self.evict();

        Ok(value)
    }

    /// Records that `consumer` read a binding defined by `producer`.
    ///
    /// Blocks with identical content are distinct nodes, so two `\def`
    /// blocks that happen to share a fingerprint never alias.
    pub fn record_edge(
        &self,
        producer: NodeIdentity,
        consumer: NodeIdentity,
    ) -> Result<(), DependencyCycle> {
        let mut edges = self.edges.lock();

        let closes = producer == consumer
            || (edges.contains_node(producer)
                && edges.contains_node(consumer)
                && has_path_connecting(&*edges, consumer, producer, None));
        if closes {
            return Err(DependencyCycle { producer, consumer });
        }

        edges.add_edge(producer, consumer, ());
        Ok(())
    }

    /// Replaces the recorded producers of `consumer` after it was evaluated
    /// again, returning the edges that were refused.
    pub fn record_edges(
        &self,
        consumer: NodeIdentity,
        producers: impl IntoIterator<Item = NodeIdentity>,
    ) -> Vec<DependencyCycle> {
        {
            let mut edges = self.edges.lock();
            if edges.contains_node(consumer) {
                let stale = edges.neighbors_directed(consumer, Direction::Incoming).collect_vec();
                for producer in stale {
                    edges.remove_edge(producer, consumer);
                }
            }
        }
        producers.into_iter().filter_map(|producer| self.record_edge(producer, consumer).err()).collect()
    }

    /// Removes every computed entry owned by `identity`, and transitively
    /// those of every block that read from it.
    pub fn invalidate(&self, identity: NodeIdentity) -> usize {
        let mut visited = FxHashSet::default();
        {
            let edges = self.edges.lock();
            let mut worklist = vec![identity];
            while let Some(node) = worklist.pop() {
                if !visited.insert(node) || !edges.contains_node(node) {
                    continue;
                }
                worklist.extend(edges.neighbors(node));
            }
        }

        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| {
            let owned = visited.contains(&slot.owner);
            let computed = matches!(*slot.state.lock(), SlotState::Computed { .. });
            !(owned && computed)
        });
        let removed = before - slots.len();

        tracing::debug!(target: "building::memo", memo = self.name, ?identity, removed, "invalidate");
        removed
    }

    /// Invalidates a block that no longer exists and drops its node, so the
    /// graph only holds blocks of live documents.
    pub fn retire(&self, identity: NodeIdentity) -> usize {
        let removed = self.invalidate(identity);
        self.edges.lock().remove_node(identity);
        removed
    }

    pub fn graph_len(&self) -> usize {
        self.edges.lock().node_count()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.slots.lock().contains_key(&fingerprint)
    }

    /// Drops the least recently used entries beyond the capacity.
    fn evict(&self) {
        let mut slots = self.slots.lock();
        if slots.len() <= self.capacity {
            return;
        }

        let oldest_pin = self.pins.oldest();
        let mut candidates: Vec<(usize, Fingerprint)> = slots
            .iter()
            .filter_map(|(&fingerprint, slot)| {
                let state = slot.state.try_lock()?;
                let SlotState::Computed { last_used, .. } = &*state else {
                    return None;
                };
                if oldest_pin.is_some_and(|pin| *last_used >= pin) {
                    return None;
                }
                Some((*last_used, fingerprint))
            })
            .collect();
        candidates.sort_unstable();

        let excess = slots.len() - self.capacity;
        let mut evicted = 0;
        for (_, fingerprint) in candidates.into_iter().take(excess) {
            slots.remove(&fingerprint);
            evicted += 1;
        }

        tracing::debug!(target: "building::memo", memo = self.name, evicted, "evict");
    }
}

/// Removes the slot of a computation that did not finish.
struct InFlight<'a, V> {
    memo: &'a Memo<V>,
    fingerprint: Fingerprint,
    slot: &'a Arc<Slot<V>>,
    finished: bool,
}

impl<V: Clone> InFlight<'_, V> {
    fn finish(mut self, value: V, revision: usize) {
        self.finished = true;
        let mut state = self.slot.state.lock();
        let computed = SlotState::Computed { value: V::clone(&value), last_used: revision };
        if let SlotState::InProgress { promises } = mem::replace(&mut *state, computed) {
            for promise in promises {
                promise.fulfill(V::clone(&value));
            }
        }
    }
}

impl<V> Drop for InFlight<'_, V> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        {
            let mut slots = self.memo.slots.lock();
            if slots.get(&self.fingerprint).is_some_and(|slot| Arc::ptr_eq(slot, self.slot)) {
                slots.remove(&self.fingerprint);
            }
        }

        // Dropping the promises wakes every waiter.
        let mut state = self.slot.state.lock();
        *state = SlotState::Abandoned;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use building_types::{Fingerprint, NodeIdentity, QueryError};
    use files::SourceStore;

    use super::{DependencyCycle, Memo, Pins};

    fn identities(count: usize) -> Vec<NodeIdentity> {
        let mut store = SourceStore::default();
        let file = store.insert("main.fol", "");
        (0..count)
            .map(|index| NodeIdentity::new(file, Fingerprint::of(&index), 0))
            .collect()
    }

    #[test]
    fn test_computes_once() {
        let [owner] = identities(1)[..] else { unreachable!() };
        let memo = Memo::new("test", 16, Pins::default());
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(Arc::new(42))
        };

        let a = memo.get_or_compute(Fingerprint::of("a"), owner, 1, compute).unwrap();
        let b = memo.get_or_compute(Fingerprint::of("a"), owner, 1, compute).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_single_flight() {
        let [owner] = identities(1)[..] else { unreachable!() };
        let memo = Memo::new("test", 16, Pins::default());
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);

        let results: Vec<_> = thread::scope(|scope| {
            let threads: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        memo.get_or_compute(Fingerprint::of("slow"), owner, 1, || {
                            calls.fetch_add(1, Ordering::Relaxed);
                            thread::sleep(Duration::from_millis(50));
                            Ok(Arc::new("value"))
                        })
                    })
                })
                .collect();
            threads.into_iter().map(|thread| thread.join().unwrap().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(results.iter().all(|result| Arc::ptr_eq(result, &results[0])));
    }

    #[test]
    fn test_cancelled_leaves_no_entry() {
        let [owner] = identities(1)[..] else { unreachable!() };
        let memo = Memo::<Arc<u32>>::new("test", 16, Pins::default());
        let fingerprint = Fingerprint::of("cancelled");

        let result = memo.get_or_compute(fingerprint, owner, 1, || Err(QueryError::Cancelled));
        assert_eq!(result, Err(QueryError::Cancelled));
        assert!(!memo.contains(fingerprint));

        let result = memo.get_or_compute(fingerprint, owner, 2, || Ok(Arc::new(1)));
        assert_eq!(result, Ok(Arc::new(1)));
    }

    #[test]
    fn test_waiters_observe_cancellation() {
        let [owner] = identities(1)[..] else { unreachable!() };
        let memo = Memo::<Arc<u32>>::new("test", 16, Pins::default());
        let fingerprint = Fingerprint::of("cancelled");
        let started = Barrier::new(2);

        let (first, second) = thread::scope(|scope| {
            let first = scope.spawn(|| {
                memo.get_or_compute(fingerprint, owner, 1, || {
                    started.wait();
                    thread::sleep(Duration::from_millis(100));
                    Err(QueryError::Cancelled)
                })
            });
            started.wait();
            let second = memo.get_or_compute(fingerprint, owner, 1, || Ok(Arc::new(7)));
            (first.join().unwrap(), second)
        });

        assert_eq!(first, Err(QueryError::Cancelled));
        assert_eq!(second, Err(QueryError::Cancelled));
        assert!(!memo.contains(fingerprint));
    }

    #[test]
    fn test_record_edge_refuses_cycles() {
        let [a, b, c] = identities(3)[..] else { unreachable!() };
        let memo = Memo::<Arc<u32>>::new("test", 16, Pins::default());

        assert_eq!(memo.record_edge(a, b), Ok(()));
        assert_eq!(memo.record_edge(b, c), Ok(()));
        assert_eq!(memo.record_edge(c, a), Err(DependencyCycle { producer: c, consumer: a }));
        assert!(memo.record_edge(a, a).is_err());

        let cycle = DependencyCycle { producer: c, consumer: a };
        assert_eq!(
            cycle.to_string(),
            "Block reads a binding from a block that already depends on it"
        );
    }

    #[test]
    fn test_record_edges_replaces_stale_producers() {
        let [a, b] = identities(2)[..] else { unreachable!() };
        let memo = Memo::<Arc<u32>>::new("test", 16, Pins::default());

        // `b` used to read from `a`; after reordering, `a` reads from `b`.
        assert!(memo.record_edges(b, [a]).is_empty());
        assert!(memo.record_edges(b, []).is_empty());
        assert!(memo.record_edges(a, [b]).is_empty());
    }

    #[test]
    fn test_invalidate_follows_edges() {
        let [a, b, c, d] = identities(4)[..] else { unreachable!() };
        let memo = Memo::new("test", 16, Pins::default());
        for (index, owner) in [a, b, c, d].into_iter().enumerate() {
            memo.get_or_compute(Fingerprint::of(&("entry", index)), owner, 1, || Ok(index)).unwrap();
        }

        memo.record_edge(a, b).unwrap();
        memo.record_edge(b, c).unwrap();

        assert_eq!(memo.invalidate(a), 3);
        assert_eq!(memo.len(), 1);
        assert!(memo.contains(Fingerprint::of(&("entry", 3usize))));
    }

    #[test]
    fn test_identical_blocks_are_distinct_nodes() {
        let mut store = SourceStore::default();
        let file = store.insert("main.fol", "");
        let repeated = Fingerprint::of(&"\\def{y}{Y} {x}");
        let a = NodeIdentity::new(file, Fingerprint::of(&"\\def{x}{zero}"), 0);
        let b = NodeIdentity::new(file, repeated, 0);
        let c = NodeIdentity::new(file, Fingerprint::of(&"\\def{x}{X} {y}"), 0);
        let d = NodeIdentity::new(file, repeated, 1);
        let memo = Memo::<Arc<u32>>::new("test", 16, Pins::default());

        // A chain through two blocks with the same text is not a cycle.
        assert!(memo.record_edges(b, [a]).is_empty());
        assert!(memo.record_edges(c, [b]).is_empty());
        assert!(memo.record_edges(d, [c]).is_empty());
        assert_eq!(memo.graph_len(), 4);
    }

    #[test]
    fn test_invalidate_keeps_same_content_elsewhere() {
        let mut store = SourceStore::default();
        let file = store.insert("main.fol", "");
        let shared = Fingerprint::of(&"paragraph");
        let first = NodeIdentity::new(file, shared, 0);
        let second = NodeIdentity::new(file, shared, 1);
        let memo = Memo::new("test", 16, Pins::default());
        memo.get_or_compute(Fingerprint::of(&first), first, 1, || Ok(0)).unwrap();
        memo.get_or_compute(Fingerprint::of(&second), second, 1, || Ok(1)).unwrap();

        assert_eq!(memo.invalidate(first), 1);
        assert!(memo.contains(Fingerprint::of(&second)));
    }

    #[test]
    fn test_retire_drops_graph_nodes() {
        let [a, b, c] = identities(3)[..] else { unreachable!() };
        let memo = Memo::new("test", 16, Pins::default());
        memo.get_or_compute(Fingerprint::of(&"b"), b, 1, || Ok(1)).unwrap();
        memo.record_edge(a, b).unwrap();
        memo.record_edge(b, c).unwrap();
        assert_eq!(memo.graph_len(), 3);

        assert_eq!(memo.retire(a), 1);
        assert_eq!(memo.graph_len(), 2);
        assert_eq!(memo.retire(b), 0);
        assert_eq!(memo.retire(c), 0);
        assert_eq!(memo.graph_len(), 0);
        assert!(memo.is_empty());
    }

    #[test]
    fn test_eviction_is_least_recently_used() {
        let [owner] = identities(1)[..] else { unreachable!() };
        let memo = Memo::new("test", 2, Pins::default());

        memo.get_or_compute(Fingerprint::of("a"), owner, 1, || Ok(1)).unwrap();
        memo.get_or_compute(Fingerprint::of("b"), owner, 2, || Ok(2)).unwrap();
        memo.get_or_compute(Fingerprint::of("a"), owner, 3, || Ok(1)).unwrap();
        memo.get_or_compute(Fingerprint::of("c"), owner, 4, || Ok(3)).unwrap();

        assert_eq!(memo.len(), 2);
        assert!(memo.contains(Fingerprint::of("a")));
        assert!(!memo.contains(Fingerprint::of("b")));
        assert!(memo.contains(Fingerprint::of("c")));
    }

    #[test]
    fn test_pinned_revisions_are_not_evicted() {
        let [owner] = identities(1)[..] else { unreachable!() };
        let pins = Pins::default();
        let memo = Memo::new("test", 1, pins.clone());

        let pin = pins.pin(1);
        memo.get_or_compute(Fingerprint::of("a"), owner, 1, || Ok(1)).unwrap();
        memo.get_or_compute(Fingerprint::of("b"), owner, 2, || Ok(2)).unwrap();
        assert_eq!(memo.len(), 2);

        drop(pin);
        memo.get_or_compute(Fingerprint::of("c"), owner, 3, || Ok(3)).unwrap();
        assert_eq!(memo.len(), 1);
        assert!(memo.contains(Fingerprint::of("c")));
    }
}
