use std::time::Duration;

use thiserror::Error;

/// Boxed error cause carried by action and rollback failures.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the sagaflow library.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The flow graph has no valid topological layering. Raised before any
    /// action executes, so no compensation is triggered.
    #[error("flow graph contains a cycle (detected at '{}')", .node.as_deref().unwrap_or("<unknown>"))]
    Cycle {
        /// One node known to sit on the cycle, if it could be identified.
        node: Option<String>,
    },

    /// A forward action failed. Aborts further layer scheduling and triggers
    /// the compensation sweep. Per-action timeouts surface as this variant.
    #[error("action '{node}' failed: {source}")]
    Action {
        node: String,
        #[source]
        source: BoxedCause,
    },

    /// A compensation action itself failed. Recorded in the compensation
    /// report; never fatal to other compensations.
    #[error("rollback for '{node}' failed: {source}")]
    Rollback {
        node: String,
        #[source]
        source: BoxedCause,
    },

    /// Two actions with the same name were added to a flow builder.
    #[error("duplicate action name '{node}' in flow graph")]
    DuplicateAction { node: String },

    /// An edge referenced an action name that was never added.
    #[error("edge references unknown action '{node}'")]
    UnknownAction { node: String },

    /// Invalid execution configuration.
    #[error("invalid flow configuration: {message}")]
    Configuration { message: String },
}

impl FlowError {
    /// Create an action failure with an arbitrary cause.
    pub fn action(node: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::Action {
            node: node.into(),
            source: source.into(),
        }
    }

    /// Create a rollback failure with an arbitrary cause.
    pub fn rollback(node: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::Rollback {
            node: node.into(),
            source: source.into(),
        }
    }

    pub(crate) fn action_timeout(node: impl Into<String>, limit: Duration) -> Self {
        Self::Action {
            node: node.into(),
            source: format!("timed out after {}ms", limit.as_millis()).into(),
        }
    }

    /// The node the error is about, when there is one.
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::Cycle { node } => node.as_deref(),
            Self::Action { node, .. }
            | Self::Rollback { node, .. }
            | Self::DuplicateAction { node }
            | Self::UnknownAction { node } => Some(node),
            Self::Configuration { .. } => None,
        }
    }

    /// Error category for metrics/logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Cycle { .. } => "cycle",
            Self::Action { .. } => "action",
            Self::Rollback { .. } => "rollback",
            Self::DuplicateAction { .. } | Self::UnknownAction { .. } => "build",
            Self::Configuration { .. } => "configuration",
        }
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, FlowError>;
