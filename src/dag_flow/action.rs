//! Actions: the units of work a flow executes.
//!
//! An [`Action`] pairs a forward function with an optional compensation that
//! undoes its effects when a later action fails. Both sides share the same
//! input contract: an ordered sequence of predecessor results.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::core::errors::{FlowError, Result};

/// Boxed future produced by closure-backed actions.
pub type ActionFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;

/// A named unit of work over the flow's value type `T`.
///
/// Receives the outputs of its direct predecessors in edge-declaration order
/// (or the caller-supplied initial inputs for root nodes) and produces one
/// output value.
#[async_trait]
pub trait NodeAction<T>: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, inputs: Vec<T>) -> anyhow::Result<T>;
}

/// Adapter that lets a plain async closure act as a named [`NodeAction`].
pub struct FnAction<T> {
    name: String,
    func: Box<dyn Fn(Vec<T>) -> ActionFuture<T> + Send + Sync>,
}

impl<T> FnAction<T> {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(move |inputs| Box::pin(func(inputs))),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> NodeAction<T> for FnAction<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, inputs: Vec<T>) -> anyhow::Result<T> {
        (self.func)(inputs).await
    }
}

/// A forward action plus an optional paired compensation.
///
/// The compensation is registered through [`Action::with_rollback`] (or
/// [`Action::with_rollback_node`]); registering a second time replaces the
/// first. It receives the same predecessor results the forward call received,
/// never the node's own output, and its return value is discarded.
pub struct Action<T> {
    forward: Arc<dyn NodeAction<T>>,
    rollback: Option<Arc<dyn NodeAction<T>>>,
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        Self {
            forward: Arc::clone(&self.forward),
            rollback: self.rollback.as_ref().map(Arc::clone),
        }
    }
}

impl<T> fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name())
            .field("has_rollback", &self.has_rollback())
            .finish()
    }
}

impl<T: Send + 'static> Action<T> {
    /// Wrap an async closure as a forward action.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::from_node(Arc::new(FnAction::new(name, func)))
    }

    /// Register an async closure as the compensation for this action.
    /// Replaces any previously registered compensation.
    pub fn with_rollback<F, Fut>(self, func: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let name = format!("{}.rollback", self.name());
        self.with_rollback_node(Arc::new(FnAction::new(name, func)))
    }
}

impl<T> Action<T> {
    /// Wrap an existing [`NodeAction`] implementation.
    pub fn from_node(forward: Arc<dyn NodeAction<T>>) -> Self {
        Self {
            forward,
            rollback: None,
        }
    }

    /// Register a [`NodeAction`] as the compensation for this action.
    /// Replaces any previously registered compensation.
    pub fn with_rollback_node(mut self, rollback: Arc<dyn NodeAction<T>>) -> Self {
        self.rollback = Some(rollback);
        self
    }

    pub fn name(&self) -> &str {
        self.forward.name()
    }

    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }

    /// Run the forward function, normalizing any failure into
    /// [`FlowError::Action`].
    pub async fn invoke(&self, inputs: Vec<T>) -> Result<T> {
        self.forward
            .execute(inputs)
            .await
            .map_err(|err| FlowError::action(self.name(), err))
    }

    /// Run the compensation, normalizing any failure into
    /// [`FlowError::Rollback`]. With no registered compensation this is a
    /// no-op returning success.
    pub async fn invoke_rollback(&self, inputs: Vec<T>) -> Result<()> {
        match &self.rollback {
            Some(rollback) => rollback
                .execute(inputs)
                .await
                .map(|_| ())
                .map_err(|err| FlowError::rollback(self.name(), err)),
            None => {
                debug!(action = self.name(), "no rollback registered");
                Ok(())
            }
        }
    }
}
