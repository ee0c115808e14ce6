//! Topological layering of a flow graph.
//!
//! The executor never walks the `petgraph` structure directly: it consumes a
//! validated [`ExecutionPlan`] built once, up front, before any action runs.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use super::action::Action;
use crate::core::errors::{FlowError, Result};

/// A validated, layered execution order for a flow graph.
///
/// Layers are Kahn-style topological generations: every node's predecessors
/// live in strictly earlier layers, and every node sits in the earliest layer
/// satisfying that property. Nodes within a layer have no dependency relation
/// to each other and may run concurrently.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    layers: Vec<Vec<NodeIndex>>,
    preds: Vec<Vec<NodeIndex>>,
    succs: Vec<Vec<NodeIndex>>,
    layer_of: Vec<usize>,
    terminals: Vec<NodeIndex>,
}

fn dedup_in_order(nodes: &mut Vec<NodeIndex>) {
    let mut seen = std::collections::HashSet::with_capacity(nodes.len());
    nodes.retain(|&node| seen.insert(node));
}

impl ExecutionPlan {
    /// Layer the graph, failing with [`FlowError::Cycle`] if no valid
    /// topological ordering exists. Runs fully before any action executes.
    pub fn build<T>(graph: &DiGraph<Action<T>, ()>) -> Result<Self> {
        let n = graph.node_count();
        let mut preds: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
        let mut succs: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];

        // petgraph walks incident edges newest-first; reverse to recover the
        // order edges were declared, which fixes the predecessor-result
        // ordering every action observes. Dependencies are a set, so parallel
        // edges collapse to a single neighbor (first declaration wins).
        for node in graph.node_indices() {
            let mut incoming: Vec<NodeIndex> =
                graph.neighbors_directed(node, Direction::Incoming).collect();
            incoming.reverse();
            dedup_in_order(&mut incoming);
            preds[node.index()] = incoming;

            let mut outgoing: Vec<NodeIndex> =
                graph.neighbors_directed(node, Direction::Outgoing).collect();
            outgoing.reverse();
            dedup_in_order(&mut outgoing);
            succs[node.index()] = outgoing;
        }

        let mut indegree: Vec<usize> = preds.iter().map(Vec::len).collect();
        let mut layer_of = vec![usize::MAX; n];
        let mut layers: Vec<Vec<NodeIndex>> = Vec::new();
        let mut placed = 0usize;

        let mut frontier: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|idx| indegree[idx.index()] == 0)
            .collect();

        while !frontier.is_empty() {
            let depth = layers.len();
            for &node in &frontier {
                layer_of[node.index()] = depth;
            }
            placed += frontier.len();

            let mut next = Vec::new();
            for &node in &frontier {
                for &succ in &succs[node.index()] {
                    indegree[succ.index()] -= 1;
                    if indegree[succ.index()] == 0 {
                        next.push(succ);
                    }
                }
            }
            layers.push(frontier);
            frontier = next;
        }

        if placed < n {
            // Every unplaced node still has positive in-degree, so any of
            // them witnesses the cycle.
            let witness = graph
                .node_indices()
                .find(|idx| layer_of[idx.index()] == usize::MAX)
                .map(|idx| graph[idx].name().to_string());
            return Err(FlowError::Cycle { node: witness });
        }

        let terminals: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|idx| succs[idx.index()].is_empty())
            .collect();

        Ok(Self {
            layers,
            preds,
            succs,
            layer_of,
            terminals,
        })
    }

    /// Layers in execution order.
    pub fn layers(&self) -> &[Vec<NodeIndex>] {
        &self.layers
    }

    /// Direct predecessors of a node, in edge-declaration order.
    pub fn predecessors(&self, node: NodeIndex) -> &[NodeIndex] {
        &self.preds[node.index()]
    }

    /// Direct successors of a node, in edge-declaration order.
    pub fn successors(&self, node: NodeIndex) -> &[NodeIndex] {
        &self.succs[node.index()]
    }

    /// Nodes with no successors, in plan-declaration order. Their outputs
    /// form the flow's result.
    pub fn terminal_nodes(&self) -> &[NodeIndex] {
        &self.terminals
    }

    /// The layer a node was assigned to.
    pub fn layer_of(&self, node: NodeIndex) -> usize {
        self.layer_of[node.index()]
    }

    pub fn node_count(&self) -> usize {
        self.layer_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layer_of.is_empty()
    }
}
