//! Layer-by-layer saga execution over a DAG of actions.
//!
//! One coordinating task drives the plan's layers sequentially; within a
//! layer every node runs as its own tokio task with no ordering guarantee
//! among siblings. A full barrier separates layers, both forward and during
//! compensation. On the first failing layer the executor stops scheduling
//! and hands the succeeded nodes to the rollback sweep.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::action::Action;
use super::plan::ExecutionPlan;
use super::report::{FlowFailure, FlowRunReport, NodeOutcome, NodeStatus};
use super::rollback;
use super::store::ResultStore;
use crate::core::errors::{FlowError, Result};

/// Execution knobs for a flow run.
#[derive(Debug, Clone, Default)]
pub struct FlowConfig {
    /// Per-action deadline. A timed-out action surfaces as that action's
    /// failure and triggers compensation like any other failure.
    pub action_timeout: Option<Duration>,
    /// Cap on concurrently running actions within a layer. `None` leaves
    /// intra-layer concurrency unbounded.
    pub max_parallel_actions: Option<usize>,
}

impl FlowConfig {
    /// Validates configuration values.
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.action_timeout {
            if limit.is_zero() {
                return Err(FlowError::Configuration {
                    message: "action_timeout must be greater than zero".to_string(),
                });
            }
        }
        if self.max_parallel_actions == Some(0) {
            return Err(FlowError::Configuration {
                message: "max_parallel_actions must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Successful run result: terminal-node outputs plus the per-node audit.
#[derive(Debug)]
pub struct FlowOutput<T> {
    /// Outputs of terminal nodes, in plan-declaration order.
    pub outputs: Vec<T>,
    pub report: FlowRunReport,
}

/// A validated, executable saga flow.
///
/// Construction layers the graph up front; a cyclic graph is rejected before
/// any action can run.
pub struct Flow<T> {
    graph: DiGraph<Action<T>, ()>,
    plan: ExecutionPlan,
    config: FlowConfig,
}

impl<T> fmt::Debug for Flow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("nodes", &self.plan.node_count())
            .field("layers", &self.plan.layers().len())
            .field("config", &self.config)
            .finish()
    }
}

impl<T> Flow<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(graph: DiGraph<Action<T>, ()>) -> Result<Self> {
        Self::with_config(graph, FlowConfig::default())
    }

    pub fn with_config(graph: DiGraph<Action<T>, ()>, config: FlowConfig) -> Result<Self> {
        config.validate()?;
        // Fail fast: no action executes unless the whole graph layers.
        let plan = ExecutionPlan::build(&graph)?;
        Ok(Self {
            graph,
            plan,
            config,
        })
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn node_name(&self, node: NodeIndex) -> &str {
        self.graph[node].name()
    }

    pub(crate) fn action(&self, node: NodeIndex) -> &Action<T> {
        &self.graph[node]
    }

    /// Predecessor results for a node, in edge-declaration order; root nodes
    /// receive the caller-supplied initial inputs instead.
    pub(crate) fn gather_inputs(
        &self,
        node: NodeIndex,
        store: &ResultStore<T>,
        initial_inputs: &[T],
    ) -> Vec<T> {
        let preds = self.plan.predecessors(node);
        if preds.is_empty() {
            initial_inputs.to_vec()
        } else {
            preds.iter().map(|&pred| store.get(pred)).collect()
        }
    }

    /// Run the flow, returning the terminal-node outputs on success.
    ///
    /// On failure the returned [`FlowFailure`] carries the triggering action
    /// error(s) and the compensation report describing what was undone.
    pub async fn run(&self, initial_inputs: Vec<T>) -> std::result::Result<Vec<T>, FlowFailure> {
        self.run_with_report(initial_inputs)
            .await
            .map(|output| output.outputs)
    }

    /// Like [`Flow::run`], but also returns the full per-node audit.
    pub async fn run_with_report(
        &self,
        initial_inputs: Vec<T>,
    ) -> std::result::Result<FlowOutput<T>, FlowFailure> {
        let store = ResultStore::new();
        let mut state = RunState::new(&self.graph);
        let semaphore = self
            .config
            .max_parallel_actions
            .map(|permits| Arc::new(Semaphore::new(permits)));

        for (depth, layer) in self.plan.layers().iter().enumerate() {
            debug!(layer = depth, nodes = layer.len(), "launching layer");

            let mut handles = Vec::with_capacity(layer.len());
            for &node in layer {
                let inputs = self.gather_inputs(node, &store, &initial_inputs);
                let action = self.action(node).clone();
                let limit = self.config.action_timeout;
                let semaphore = semaphore.clone();
                state.mark_running(node);

                handles.push(tokio::spawn(async move {
                    let _permit = match semaphore {
                        Some(semaphore) => Some(
                            semaphore
                                .acquire_owned()
                                .await
                                .expect("flow semaphore closed"),
                        ),
                        None => None,
                    };
                    let started = Utc::now();
                    let result = match limit {
                        Some(limit) => match timeout(limit, action.invoke(inputs)).await {
                            Ok(result) => result,
                            Err(_) => Err(FlowError::action_timeout(action.name(), limit)),
                        },
                        None => action.invoke(inputs).await,
                    };
                    (started, Utc::now(), result)
                }));
            }

            // Layer barrier. Siblings of a failed node drain to completion so
            // their side effects are known and can be compensated.
            let mut layer_errors: Vec<FlowError> = Vec::new();
            for (&node, joined) in layer.iter().zip(join_all(handles).await) {
                match joined {
                    Ok((started, finished, Ok(value))) => {
                        debug!(node = self.node_name(node), "action succeeded");
                        store.put(node, value);
                        state.mark_succeeded(node, started, finished);
                    }
                    Ok((started, finished, Err(err))) => {
                        warn!(node = self.node_name(node), error = %err, "action failed");
                        state.mark_failed(node, Some(started), Some(finished), err.to_string());
                        layer_errors.push(err);
                    }
                    Err(join_err) => {
                        let err = FlowError::action(
                            self.node_name(node),
                            format!("action panicked: {join_err}"),
                        );
                        warn!(node = self.node_name(node), error = %err, "action panicked");
                        state.mark_failed(node, None, Some(Utc::now()), err.to_string());
                        layer_errors.push(err);
                    }
                }
            }

            if !layer_errors.is_empty() {
                info!(
                    layer = depth,
                    failures = layer_errors.len(),
                    "layer failed, compensating succeeded ancestors"
                );
                let compensation =
                    rollback::compensate(self, &store, &initial_inputs, &mut state).await;
                let report = state.report(false, Some(layer_errors[0].to_string()));
                return Err(FlowFailure {
                    errors: layer_errors,
                    compensation,
                    report,
                });
            }
        }

        let outputs = self
            .plan
            .terminal_nodes()
            .iter()
            .map(|&node| store.get(node))
            .collect();
        info!(nodes = self.plan.node_count(), "flow completed");
        Ok(FlowOutput {
            outputs,
            report: state.report(true, None),
        })
    }
}

/// Mutable per-run node bookkeeping. Only the coordinating task touches it;
/// worker tasks report back through their join handles.
pub(crate) struct RunState {
    names: Vec<String>,
    statuses: Vec<NodeStatus>,
    started_at: Vec<Option<DateTime<Utc>>>,
    finished_at: Vec<Option<DateTime<Utc>>>,
    errors: Vec<Option<String>>,
}

impl RunState {
    fn new<T>(graph: &DiGraph<Action<T>, ()>) -> Self {
        let names = graph
            .node_indices()
            .map(|idx| graph[idx].name().to_string())
            .collect::<Vec<_>>();
        let count = names.len();
        Self {
            names,
            statuses: vec![NodeStatus::Pending; count],
            started_at: vec![None; count],
            finished_at: vec![None; count],
            errors: vec![None; count],
        }
    }

    fn mark_running(&mut self, node: NodeIndex) {
        debug_assert_eq!(self.statuses[node.index()], NodeStatus::Pending);
        self.statuses[node.index()] = NodeStatus::Running;
    }

    fn mark_succeeded(
        &mut self,
        node: NodeIndex,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    ) {
        debug_assert_eq!(self.statuses[node.index()], NodeStatus::Running);
        self.statuses[node.index()] = NodeStatus::Succeeded;
        self.started_at[node.index()] = Some(started);
        self.finished_at[node.index()] = Some(finished);
    }

    fn mark_failed(
        &mut self,
        node: NodeIndex,
        started: Option<DateTime<Utc>>,
        finished: Option<DateTime<Utc>>,
        error: String,
    ) {
        debug_assert_eq!(self.statuses[node.index()], NodeStatus::Running);
        self.statuses[node.index()] = NodeStatus::Failed;
        self.started_at[node.index()] = started;
        self.finished_at[node.index()] = finished;
        self.errors[node.index()] = Some(error);
    }

    pub(crate) fn mark_rolled_back(&mut self, node: NodeIndex) {
        debug_assert_eq!(self.statuses[node.index()], NodeStatus::Succeeded);
        self.statuses[node.index()] = NodeStatus::RolledBack;
    }

    pub(crate) fn is_succeeded(&self, node: NodeIndex) -> bool {
        self.statuses[node.index()] == NodeStatus::Succeeded
    }

    fn report(&self, success: bool, error: Option<String>) -> FlowRunReport {
        let nodes = self
            .names
            .iter()
            .enumerate()
            .map(|(idx, name)| NodeOutcome {
                node: name.clone(),
                status: self.statuses[idx],
                started_at: self.started_at[idx],
                finished_at: self.finished_at[idx],
                error: self.errors[idx].clone(),
            })
            .collect();
        FlowRunReport {
            success,
            nodes,
            error,
        }
    }
}
