//! sagaflow - saga-style execution of DAGs of async actions.
//!
//! A flow is a directed acyclic graph of [`Action`]s. The engine layers the
//! graph topologically, runs each layer's actions concurrently, and passes
//! every action the outputs of its direct predecessors. When an action
//! fails, already-succeeded ancestors are undone by invoking their
//! registered compensating actions in reverse dependency order, yielding
//! eventual consistency instead of an all-or-nothing transaction.
//!
//! ```no_run
//! use sagaflow::{Action, FlowBuilder};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = FlowBuilder::new();
//! builder.add_action(
//!     Action::new("reserve", |inputs: Vec<i64>| async move {
//!         Ok(inputs.iter().sum::<i64>() + 1)
//!     })
//!     .with_rollback(|_inputs| async move {
//!         // release the reservation
//!         Ok(0)
//!     }),
//! )?;
//! builder.add_action(Action::new("charge", |inputs: Vec<i64>| async move {
//!     Ok(inputs.iter().sum::<i64>() * 2)
//! }))?;
//! builder.add_edge("reserve", "charge")?;
//!
//! let flow = builder.build()?;
//! let outputs = flow.run(vec![0]).await?;
//! assert_eq!(outputs, vec![2]);
//! # Ok(())
//! # }
//! ```

// Core infrastructure modules
pub mod core {
    pub mod errors;
}

// Saga-over-DAG execution
pub mod dag_flow;

// Re-exports for convenience
pub use crate::core::errors::{BoxedCause, FlowError, Result};
pub use dag_flow::*;
