pub mod action;
pub mod builder;
pub mod executor;
pub mod plan;
pub mod report;
mod rollback;
pub mod store;

pub use action::{Action, ActionFuture, FnAction, NodeAction};
pub use builder::FlowBuilder;
pub use executor::{Flow, FlowConfig, FlowOutput};
pub use plan::ExecutionPlan;
pub use report::{
    CompensationOutcome, CompensationReport, CompensationStatus, FlowFailure, FlowRunReport,
    NodeOutcome, NodeStatus,
};
pub use store::ResultStore;
