use std::iter;

use rustc_hash::FxHashMap;

use super::SnapshotId;

/// Which snapshot waits on which.
///
/// A snapshot waits on at most one other snapshot at a time, so the graph is
/// a set of chains. A wait that would make a chain loop back onto the waiter
/// is a cycle between queries running on different threads.
#[derive(Debug, Default)]
pub(crate) struct WaitGraph {
    waits_on: FxHashMap<SnapshotId, SnapshotId>,
}

impl WaitGraph {
    /// Records that `waiter` waits on `owner`, unless that closes a cycle.
    pub(crate) fn wait(&mut self, waiter: SnapshotId, owner: SnapshotId) -> bool {
        let mut chain = iter::successors(Some(owner), |id| self.waits_on.get(id).copied());
        if chain.any(|id| id == waiter) {
            return false;
        }
        self.waits_on.insert(waiter, owner);
        true
    }

    /// Releases every snapshot waiting on `owner` once it has finished.
    pub(crate) fn release(&mut self, owner: SnapshotId) {
        self.waits_on.retain(|_, id| *id != owner);
        self.waits_on.remove(&owner);
    }
}

#[cfg(test)]
mod tests {
    use super::{SnapshotId, WaitGraph};

    #[test]
    fn test_two_snapshots() {
        let mut graph = WaitGraph::default();
        assert!(graph.wait(SnapshotId(0), SnapshotId(1)));
        assert!(!graph.wait(SnapshotId(1), SnapshotId(0)));
    }

    #[test]
    fn test_chain() {
        let mut graph = WaitGraph::default();
        assert!(graph.wait(SnapshotId(0), SnapshotId(1)));
        assert!(graph.wait(SnapshotId(1), SnapshotId(2)));
        assert!(!graph.wait(SnapshotId(2), SnapshotId(0)));

        graph.release(SnapshotId(1));
        assert!(graph.wait(SnapshotId(2), SnapshotId(0)));
    }

    #[test]
    fn test_waiting_on_itself() {
        let mut graph = WaitGraph::default();
        assert!(!graph.wait(SnapshotId(3), SnapshotId(3)));
    }
}
