use alloc::vec::Vec;
use std::collections::BTreeSet;

use crate::NodeId;

/// A validation phase.
///
/// The declaration order is the drain order of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    Data,
    RawData,
    DataItems,
    DataRange,
    Layout,
    Content,
    Position,
}

impl Phase {
    pub const COUNT: usize = 7;

    /// All phases in drain order.
    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::Data,
        Phase::RawData,
        Phase::DataItems,
        Phase::DataRange,
        Phase::Layout,
        Phase::Content,
        Phase::Position,
    ];

    pub const fn slot(self) -> usize {
        self as usize
    }

    pub const fn is_data_phase(self) -> bool {
        matches!(
            self,
            Phase::Data | Phase::RawData | Phase::DataItems | Phase::DataRange
        )
    }
}

/// Per-phase sets of nodes awaiting validation.
///
/// Sets are idempotent: inserting a node that is already pending is a no-op. Iteration order is
/// by handle, which keeps frames deterministic.
#[derive(Clone, Debug, Default)]
pub struct InvalidationRegistry {
    sets: [BTreeSet<NodeId>; Phase::COUNT],
}

impl InvalidationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the node was not already pending.
    pub fn insert(&mut self, node: NodeId, phase: Phase) -> bool {
        self.sets[phase.slot()].insert(node)
    }

    /// Returns `true` if the node was pending.
    pub fn remove(&mut self, node: NodeId, phase: Phase) -> bool {
        self.sets[phase.slot()].remove(&node)
    }

    /// Removes the node from every phase set. Returns how many sets it was in.
    pub fn remove_all(&mut self, node: NodeId) -> usize {
        self.sets
            .iter_mut()
            .map(|set| set.remove(&node) as usize)
            .sum()
    }

    pub fn contains(&self, node: NodeId, phase: Phase) -> bool {
        self.sets[phase.slot()].contains(&node)
    }

    pub fn contains_any(&self, node: NodeId) -> bool {
        self.sets.iter().any(|set| set.contains(&node))
    }

    pub fn len(&self, phase: Phase) -> usize {
        self.sets[phase.slot()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(BTreeSet::is_empty)
    }

    /// Copies the current members of a phase set.
    ///
    /// Drains iterate the snapshot rather than the live set, so nodes marked while a phase is
    /// draining wait for the next frame.
    pub fn snapshot(&self, phase: Phase) -> Vec<NodeId> {
        self.sets[phase.slot()].iter().copied().collect()
    }

    pub fn clear(&mut self) {
        for set in &mut self.sets {
            set.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn ids(n: usize) -> Vec<NodeId> {
        let mut arena = Arena::new();
        (0..n).map(|_| arena.insert_with(|_| ())).collect()
    }

    #[test]
    fn insert_is_idempotent() {
        let a = ids(1)[0];
        let mut r = InvalidationRegistry::new();
        assert!(r.insert(a, Phase::Content));
        assert!(!r.insert(a, Phase::Content));
        assert_eq!(r.len(Phase::Content), 1);
        assert_eq!(r.len(Phase::Position), 0);
    }

    #[test]
    fn remove_all_clears_every_phase() {
        let nodes = ids(2);
        let mut r = InvalidationRegistry::new();
        for phase in Phase::ALL {
            r.insert(nodes[0], phase);
        }
        r.insert(nodes[1], Phase::Layout);
        assert_eq!(r.remove_all(nodes[0]), Phase::COUNT);
        assert!(!r.contains_any(nodes[0]));
        assert!(r.contains(nodes[1], Phase::Layout));
        assert!(!r.is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_live_set() {
        let nodes = ids(3);
        let mut r = InvalidationRegistry::new();
        r.insert(nodes[0], Phase::Data);
        let snap = r.snapshot(Phase::Data);
        r.insert(nodes[1], Phase::Data);
        assert_eq!(snap, vec![nodes[0]]);
        assert_eq!(r.len(Phase::Data), 2);
    }

    #[test]
    fn phases_are_declared_in_drain_order() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
        assert!(Phase::DataRange < Phase::Content);
        assert!(Phase::Content < Phase::Position);
    }
}
