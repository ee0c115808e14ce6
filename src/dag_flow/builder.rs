//! Name-keyed convenience for assembling a flow graph.
//!
//! The builder is a thin wrapper, not a boundary: callers may equally build
//! a `DiGraph<Action<T>, ()>` themselves and hand it to [`Flow::new`].

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use super::action::Action;
use super::executor::{Flow, FlowConfig};
use crate::core::errors::{FlowError, Result};

pub struct FlowBuilder<T> {
    graph: DiGraph<Action<T>, ()>,
    by_name: HashMap<String, NodeIndex>,
}

impl<T: Clone + Send + Sync + 'static> FlowBuilder<T> {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            by_name: HashMap::new(),
        }
    }

    /// Add an action as a graph node. Action names must be unique within a
    /// flow.
    pub fn add_action(&mut self, action: Action<T>) -> Result<NodeIndex> {
        if self.by_name.contains_key(action.name()) {
            return Err(FlowError::DuplicateAction {
                node: action.name().to_string(),
            });
        }
        let name = action.name().to_string();
        let idx = self.graph.add_node(action);
        self.by_name.insert(name, idx);
        Ok(idx)
    }

    /// Declare a dependency edge: `to` runs after `from` and receives its
    /// output. Edge declaration order fixes the order of `to`'s inputs.
    /// Dependencies form a set, so redeclaring an edge is a no-op.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let from_idx = self.lookup(from)?;
        let to_idx = self.lookup(to)?;
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<NodeIndex> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FlowError::UnknownAction {
                node: name.to_string(),
            })
    }

    /// Validate and layer the assembled graph.
    pub fn build(self) -> Result<Flow<T>> {
        Flow::new(self.graph)
    }

    pub fn build_with_config(self, config: FlowConfig) -> Result<Flow<T>> {
        Flow::with_config(self.graph, config)
    }

    /// Hand back the raw graph instead of building a flow.
    pub fn into_graph(self) -> DiGraph<Action<T>, ()> {
        self.graph
    }
}

impl<T: Clone + Send + Sync + 'static> Default for FlowBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}
