//! Per-run storage of node outputs.

use dashmap::DashMap;
use petgraph::graph::NodeIndex;

/// Write-once store of each node's produced value, keyed by node identity.
///
/// Layer barriers guarantee a node's value is written before any successor
/// reads it, so each key is written exactly once and read only afterwards.
/// Violations are programming errors in the executor, not user-facing
/// failures; both [`ResultStore::put`] and [`ResultStore::get`] panic on
/// them rather than blocking or returning an error.
#[derive(Debug)]
pub struct ResultStore<T> {
    slots: DashMap<NodeIndex, T>,
}

impl<T: Clone> ResultStore<T> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Record a node's output.
    ///
    /// # Panics
    ///
    /// Panics if the node already has a recorded output.
    pub fn put(&self, node: NodeIndex, value: T) {
        let prior = self.slots.insert(node, value);
        assert!(prior.is_none(), "result for {node:?} written twice");
    }

    /// Read a node's output.
    ///
    /// # Panics
    ///
    /// Panics if the node has not produced an output yet; callers must only
    /// request values of nodes that already succeeded.
    pub fn get(&self, node: NodeIndex) -> T {
        match self.slots.get(&node) {
            Some(value) => value.clone(),
            None => panic!("result for {node:?} requested before it was written"),
        }
    }

    pub fn contains(&self, node: NodeIndex) -> bool {
        self.slots.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T: Clone> Default for ResultStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
