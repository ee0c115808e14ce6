//! Run reports: per-node outcomes, compensation results, and the structured
//! failure surfaced by a flow run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::FlowError;

/// Lifecycle of a single node within one run.
///
/// Transitions are monotonic: `Pending -> Running -> Succeeded | Failed`,
/// with `Succeeded -> RolledBack` only during a compensation sweep, at most
/// once. A node never re-enters `Running` after reaching a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    RolledBack,
}

/// Per-node record of what happened during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub node: String,
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Display form of the forward error, for failed nodes.
    pub error: Option<String>,
}

/// Full audit of one run: every node's final status and timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRunReport {
    pub success: bool,
    pub nodes: Vec<NodeOutcome>,
    /// Display form of the triggering error, for failed runs.
    pub error: Option<String>,
}

impl FlowRunReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Outcome for a node by name, if it exists in the report.
    pub fn node(&self, name: &str) -> Option<&NodeOutcome> {
        self.nodes.iter().find(|outcome| outcome.node == name)
    }
}

/// Result of compensating a single succeeded node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompensationStatus {
    /// The registered rollback ran to completion.
    RolledBack,
    /// The node had no registered rollback; nothing to undo.
    Skipped,
    /// The rollback itself failed; the sweep continued regardless.
    Failed { message: String },
}

/// Per-node compensation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationOutcome {
    pub node: String,
    pub status: CompensationStatus,
    pub finished_at: DateTime<Utc>,
}

/// Aggregated outcome of a best-effort compensation sweep.
///
/// Rollback failures are recorded here, never swallowed and never fatal to
/// the other compensations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompensationReport {
    pub outcomes: Vec<CompensationOutcome>,
}

impl CompensationReport {
    /// True when every attempted rollback completed.
    pub fn is_clean(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|outcome| matches!(outcome.status, CompensationStatus::Failed { .. }))
    }

    /// Names of nodes whose rollback ran to completion.
    pub fn rolled_back(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status == CompensationStatus::RolledBack)
            .map(|outcome| outcome.node.as_str())
    }

    /// (node, message) pairs for rollbacks that failed.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|outcome| match &outcome.status {
            CompensationStatus::Failed { message } => {
                Some((outcome.node.as_str(), message.as_str()))
            }
            _ => None,
        })
    }

    pub fn outcome(&self, name: &str) -> Option<&CompensationOutcome> {
        self.outcomes.iter().find(|outcome| outcome.node == name)
    }

    pub(crate) fn record(&mut self, node: String, status: CompensationStatus) {
        self.outcomes.push(CompensationOutcome {
            node,
            status,
            finished_at: Utc::now(),
        });
    }
}

/// Structured failure returned by a flow run.
///
/// Carries the forward errors from the failing layer (the first is the
/// trigger; siblings that failed in the same layer are kept too), the
/// compensation report describing what was undone, and the full per-node
/// audit for the run.
#[derive(Debug)]
pub struct FlowFailure {
    /// At least one entry; `errors[0]` is the triggering error.
    pub errors: Vec<FlowError>,
    pub compensation: CompensationReport,
    pub report: FlowRunReport,
}

impl FlowFailure {
    /// The error that aborted the run.
    pub fn trigger(&self) -> &FlowError {
        &self.errors[0]
    }
}

impl fmt::Display for FlowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rolled_back = self.compensation.rolled_back().count();
        let rollback_failures = self.compensation.failures().count();
        write!(
            f,
            "flow run failed: {} ({} node(s) rolled back, {} rollback failure(s))",
            self.trigger(),
            rolled_back,
            rollback_failures
        )
    }
}

impl std::error::Error for FlowFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.trigger())
    }
}
