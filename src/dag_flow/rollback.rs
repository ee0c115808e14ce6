//! Best-effort reverse-order compensation sweep.
//!
//! Walks the plan's layers deepest-first and invokes the rollback of every
//! node that reached `Succeeded`, with the same predecessor inputs its
//! forward call received. Reverse layering guarantees a node's rollback
//! never starts before the rollbacks of all its succeeded successors have
//! finished. A rollback failure is recorded and the sweep continues.

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::executor::{Flow, RunState};
use super::report::{CompensationReport, CompensationStatus};
use super::store::ResultStore;
use crate::core::errors::FlowError;

pub(crate) async fn compensate<T>(
    flow: &Flow<T>,
    store: &ResultStore<T>,
    initial_inputs: &[T],
    state: &mut RunState,
) -> CompensationReport
where
    T: Clone + Send + Sync + 'static,
{
    let mut report = CompensationReport::default();

    for (depth, layer) in flow.plan().layers().iter().enumerate().rev() {
        let mut handles = Vec::new();
        for &node in layer {
            // Only nodes that reached Succeeded are compensated; Failed and
            // never-scheduled nodes have nothing to undo.
            if !state.is_succeeded(node) {
                continue;
            }

            let action = flow.action(node).clone();
            if !action.has_rollback() {
                debug!(node = action.name(), "no rollback registered, skipping");
                report.record(action.name().to_string(), CompensationStatus::Skipped);
                continue;
            }

            // Same inputs the forward call received, never the node's own
            // output.
            let inputs = flow.gather_inputs(node, store, initial_inputs);
            handles.push((
                node,
                tokio::spawn(async move { action.invoke_rollback(inputs).await }),
            ));
        }

        if handles.is_empty() {
            continue;
        }
        debug!(layer = depth, count = handles.len(), "compensating layer");

        // Barrier mirroring forward execution: the next-shallower layer only
        // starts after every compensation in this layer finished.
        let (nodes, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        for (node, joined) in nodes.into_iter().zip(join_all(tasks).await) {
            let name = flow.node_name(node).to_string();
            match joined {
                Ok(Ok(())) => {
                    info!(node = %name, "rolled back");
                    state.mark_rolled_back(node);
                    report.record(name, CompensationStatus::RolledBack);
                }
                Ok(Err(err)) => {
                    warn!(node = %name, error = %err, "rollback failed, continuing sweep");
                    report.record(
                        name,
                        CompensationStatus::Failed {
                            message: err.to_string(),
                        },
                    );
                }
                Err(join_err) => {
                    let err = FlowError::rollback(&name, format!("rollback panicked: {join_err}"));
                    warn!(node = %name, error = %err, "rollback panicked, continuing sweep");
                    report.record(
                        name,
                        CompensationStatus::Failed {
                            message: err.to_string(),
                        },
                    );
                }
            }
        }
    }

    report
}
