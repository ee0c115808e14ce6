//! End-to-end tests for saga flow execution and compensation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use sagaflow::{
    Action, CompensationStatus, FlowBuilder, FlowConfig, FlowError, NodeStatus,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Action that sums its predecessor results and adds a constant.
fn add(name: &str, k: i64) -> Action<i64> {
    Action::new(name, move |inputs: Vec<i64>| async move {
        Ok(inputs.iter().sum::<i64>() + k)
    })
}

fn failing(name: &str) -> Action<i64> {
    Action::new(name, |_inputs: Vec<i64>| async move {
        Err(anyhow::anyhow!("failing purposefully"))
    })
}

/// Attach a rollback that counts its invocations.
fn counting_rollback(action: Action<i64>, counter: &Arc<AtomicU32>) -> Action<i64> {
    let counter = Arc::clone(counter);
    action.with_rollback(move |_inputs| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        }
    })
}

/// Attach a rollback that records the node name in a shared log.
fn logging_rollback(action: Action<i64>, log: &Arc<Mutex<Vec<String>>>) -> Action<i64> {
    let log = Arc::clone(log);
    let name = action.name().to_string();
    action.with_rollback(move |_inputs| {
        let log = Arc::clone(&log);
        let name = name.clone();
        async move {
            log.lock().unwrap().push(name);
            Ok(0)
        }
    })
}

/// root(+1) feeding layer1_f1(+2) and layer1_f2(+3); layer2_f1(+4) reads
/// layer1_f1, layer2_f2(+5) reads both layer1 actions.
fn diamond() -> FlowBuilder<i64> {
    let mut builder = FlowBuilder::new();
    builder.add_action(add("root", 1)).unwrap();
    builder.add_action(add("layer1_f1", 2)).unwrap();
    builder.add_action(add("layer1_f2", 3)).unwrap();
    builder.add_action(add("layer2_f1", 4)).unwrap();
    builder.add_action(add("layer2_f2", 5)).unwrap();
    builder.add_edge("root", "layer1_f1").unwrap();
    builder.add_edge("root", "layer1_f2").unwrap();
    builder.add_edge("layer1_f1", "layer2_f1").unwrap();
    builder.add_edge("layer1_f1", "layer2_f2").unwrap();
    builder.add_edge("layer1_f2", "layer2_f2").unwrap();
    builder
}

#[tokio::test]
async fn test_diamond_terminal_outputs() {
    init_tracing();
    for (initial, expected) in [(0, vec![7, 12]), (1, vec![8, 14]), (2, vec![9, 16])] {
        let flow = diamond().build().unwrap();
        let outputs = flow.run(vec![initial]).await.unwrap();
        assert_eq!(outputs, expected, "initial input {initial}");
    }
}

#[tokio::test]
async fn test_flow_is_reusable_across_runs() {
    let flow = diamond().build().unwrap();
    assert_eq!(flow.run(vec![0]).await.unwrap(), vec![7, 12]);
    assert_eq!(flow.run(vec![1]).await.unwrap(), vec![8, 14]);
}

#[tokio::test]
async fn test_cyclic_graph_rejected_before_any_action_runs() {
    let invocations = Arc::new(AtomicU32::new(0));
    let counting = |name: &str, counter: &Arc<AtomicU32>| {
        let counter = Arc::clone(counter);
        Action::new(name, move |_inputs: Vec<i64>| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            }
        })
    };

    let mut builder = FlowBuilder::new();
    builder.add_action(counting("a", &invocations)).unwrap();
    builder.add_action(counting("b", &invocations)).unwrap();
    builder.add_edge("a", "b").unwrap();
    builder.add_edge("b", "a").unwrap();

    let err = builder.build().unwrap_err();
    assert!(matches!(err, FlowError::Cycle { .. }));
    assert_eq!(invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_empty_flow_returns_no_outputs() {
    let flow = FlowBuilder::<i64>::new().build().unwrap();
    let outputs = flow.run(vec![]).await.unwrap();
    assert!(outputs.is_empty());
}

#[tokio::test]
async fn test_root_nodes_receive_initial_inputs() {
    let mut builder = FlowBuilder::new();
    builder.add_action(add("sum", 0)).unwrap();
    let flow = builder.build().unwrap();
    assert_eq!(flow.run(vec![5, 6]).await.unwrap(), vec![11]);
}

#[tokio::test]
async fn test_failure_rolls_back_succeeded_ancestors_only() {
    init_tracing();
    let a_rollbacks = Arc::new(AtomicU32::new(0));
    let b_rollbacks = Arc::new(AtomicU32::new(0));

    let mut builder = FlowBuilder::new();
    builder
        .add_action(counting_rollback(add("a", 1), &a_rollbacks))
        .unwrap();
    builder
        .add_action(counting_rollback(failing("b"), &b_rollbacks))
        .unwrap();
    builder.add_edge("a", "b").unwrap();

    let flow = builder.build().unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    assert_eq!(a_rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(b_rollbacks.load(Ordering::SeqCst), 0);
    assert!(matches!(failure.trigger(), FlowError::Action { node, .. } if node == "b"));
    assert_eq!(
        failure.compensation.outcome("a").map(|o| &o.status),
        Some(&CompensationStatus::RolledBack)
    );
    assert!(failure.compensation.outcome("b").is_none());
    assert_eq!(
        failure.report.node("a").map(|o| o.status),
        Some(NodeStatus::RolledBack)
    );
    assert_eq!(
        failure.report.node("b").map(|o| o.status),
        Some(NodeStatus::Failed)
    );
}

#[tokio::test]
async fn test_node_without_rollback_is_skipped_silently() {
    let b_rollbacks = Arc::new(AtomicU32::new(0));

    let mut builder = FlowBuilder::new();
    builder.add_action(add("a", 1)).unwrap();
    builder
        .add_action(counting_rollback(add("b", 1), &b_rollbacks))
        .unwrap();
    builder.add_action(failing("c")).unwrap();
    builder.add_edge("a", "b").unwrap();
    builder.add_edge("b", "c").unwrap();

    let flow = builder.build().unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    assert_eq!(b_rollbacks.load(Ordering::SeqCst), 1);
    assert!(failure.compensation.is_clean());
    assert_eq!(
        failure.compensation.outcome("a").map(|o| &o.status),
        Some(&CompensationStatus::Skipped)
    );
    assert_eq!(
        failure.compensation.rolled_back().collect::<Vec<_>>(),
        vec!["b"]
    );
}

#[tokio::test]
async fn test_compensation_runs_in_reverse_dependency_order() {
    init_tracing();
    let order = Arc::new(Mutex::new(Vec::new()));

    // a -> b -> {c, d}; d fails after c succeeded, so the sweep must undo
    // c before b and b before a.
    let mut builder = FlowBuilder::new();
    builder
        .add_action(logging_rollback(add("a", 1), &order))
        .unwrap();
    builder
        .add_action(logging_rollback(add("b", 1), &order))
        .unwrap();
    builder
        .add_action(logging_rollback(add("c", 1), &order))
        .unwrap();
    builder.add_action(failing("d")).unwrap();
    builder.add_edge("a", "b").unwrap();
    builder.add_edge("b", "c").unwrap();
    builder.add_edge("b", "d").unwrap();

    let flow = builder.build().unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    assert!(matches!(failure.trigger(), FlowError::Action { node, .. } if node == "d"));
    let order = order.lock().unwrap();
    assert_eq!(*order, vec!["c", "b", "a"]);
}

#[tokio::test]
async fn test_sibling_failures_all_reported_and_rollbacks_run_once() {
    let a_rollbacks = Arc::new(AtomicU32::new(0));
    let d_rollbacks = Arc::new(AtomicU32::new(0));

    let mut builder = FlowBuilder::new();
    builder
        .add_action(counting_rollback(add("a", 1), &a_rollbacks))
        .unwrap();
    builder.add_action(failing("b")).unwrap();
    builder.add_action(failing("c")).unwrap();
    builder
        .add_action(counting_rollback(add("d", 1), &d_rollbacks))
        .unwrap();
    builder.add_edge("a", "b").unwrap();
    builder.add_edge("a", "c").unwrap();
    builder.add_edge("a", "d").unwrap();

    let flow = builder.build().unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    assert_eq!(failure.errors.len(), 2);
    assert!(matches!(failure.trigger(), FlowError::Action { node, .. } if node == "b"));
    // Sibling d succeeded in the failing layer and is compensated exactly
    // once, like its ancestor.
    assert_eq!(a_rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(d_rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rollback_failure_does_not_stop_sweep() {
    init_tracing();
    let a_rollbacks = Arc::new(AtomicU32::new(0));

    let mut builder = FlowBuilder::new();
    builder
        .add_action(counting_rollback(add("a", 1), &a_rollbacks))
        .unwrap();
    builder
        .add_action(add("b", 1).with_rollback(|_inputs| async move {
            Err(anyhow::anyhow!("undo failed"))
        }))
        .unwrap();
    builder.add_action(failing("c")).unwrap();
    builder.add_edge("a", "b").unwrap();
    builder.add_edge("b", "c").unwrap();

    let flow = builder.build().unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    assert_eq!(a_rollbacks.load(Ordering::SeqCst), 1);
    assert!(!failure.compensation.is_clean());
    let failures: Vec<_> = failure.compensation.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "b");
    assert!(failures[0].1.contains("undo failed"));
    assert_eq!(
        failure.compensation.outcome("a").map(|o| &o.status),
        Some(&CompensationStatus::RolledBack)
    );
}

#[tokio::test]
async fn test_action_timeout_surfaces_as_failure_and_compensates() {
    init_tracing();
    let a_rollbacks = Arc::new(AtomicU32::new(0));

    let mut builder = FlowBuilder::new();
    builder
        .add_action(counting_rollback(add("a", 1), &a_rollbacks))
        .unwrap();
    builder
        .add_action(Action::new("slow", |_inputs: Vec<i64>| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(0)
        }))
        .unwrap();
    builder.add_edge("a", "slow").unwrap();

    let config = FlowConfig {
        action_timeout: Some(Duration::from_millis(50)),
        max_parallel_actions: None,
    };
    let flow = builder.build_with_config(config).unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    assert!(matches!(failure.trigger(), FlowError::Action { node, .. } if node == "slow"));
    assert!(failure.trigger().to_string().contains("timed out"));
    assert_eq!(a_rollbacks.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_parallelism_cap_of_one_still_correct() {
    let config = FlowConfig {
        action_timeout: None,
        max_parallel_actions: Some(1),
    };
    let flow = diamond().build_with_config(config).unwrap();
    assert_eq!(flow.run(vec![0]).await.unwrap(), vec![7, 12]);
}

#[tokio::test]
async fn test_in_flight_sibling_drains_and_is_compensated() {
    let slow_runs = Arc::new(AtomicU32::new(0));
    let slow_rollbacks = Arc::new(AtomicU32::new(0));

    let runs = Arc::clone(&slow_runs);
    let slow = Action::new("slow", move |inputs: Vec<i64>| {
        let runs = Arc::clone(&runs);
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().sum::<i64>())
        }
    });

    let mut builder = FlowBuilder::new();
    builder.add_action(add("a", 1)).unwrap();
    builder.add_action(failing("fast_fail")).unwrap();
    builder
        .add_action(counting_rollback(slow, &slow_rollbacks))
        .unwrap();
    builder.add_edge("a", "fast_fail").unwrap();
    builder.add_edge("a", "slow").unwrap();

    let flow = builder.build().unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    // The sibling was not cancelled: it ran to completion and its side
    // effects were undone.
    assert_eq!(slow_runs.load(Ordering::SeqCst), 1);
    assert_eq!(slow_rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(
        failure.report.node("slow").map(|o| o.status),
        Some(NodeStatus::RolledBack)
    );
}

#[tokio::test]
async fn test_rollback_receives_forward_inputs_not_own_output() {
    let seen = Arc::new(Mutex::new(None));
    let seen_clone = Arc::clone(&seen);

    let b = Action::new("b", |inputs: Vec<i64>| async move {
        Ok(inputs.iter().sum::<i64>() + 1)
    })
    .with_rollback(move |inputs: Vec<i64>| {
        let seen = Arc::clone(&seen_clone);
        async move {
            *seen.lock().unwrap() = Some(inputs);
            Ok(0)
        }
    });

    let mut builder = FlowBuilder::new();
    builder.add_action(add("a", 41)).unwrap();
    builder.add_action(b).unwrap();
    builder.add_action(failing("c")).unwrap();
    builder.add_edge("a", "b").unwrap();
    builder.add_edge("b", "c").unwrap();

    let flow = builder.build().unwrap();
    flow.run(vec![0]).await.unwrap_err();

    // b's forward call saw [a's output]; its rollback must see the same.
    assert_eq!(*seen.lock().unwrap(), Some(vec![41]));
}

#[tokio::test]
async fn test_run_with_report_success_audit() {
    let flow = diamond().build().unwrap();
    let output = flow.run_with_report(vec![0]).await.unwrap();

    assert_eq!(output.outputs, vec![7, 12]);
    assert!(output.report.success);
    assert!(output.report.error.is_none());
    assert_eq!(output.report.nodes.len(), 5);
    for node in &output.report.nodes {
        assert_eq!(node.status, NodeStatus::Succeeded, "node {}", node.node);
        assert!(node.started_at.is_some());
        assert!(node.finished_at.is_some());
        assert!(node.error.is_none());
    }
    assert!(output.report.to_json_pretty().unwrap().contains("root"));
}

#[tokio::test]
async fn test_failure_report_marks_unscheduled_nodes_pending() {
    let mut builder = FlowBuilder::new();
    builder.add_action(failing("a")).unwrap();
    builder.add_action(add("b", 1)).unwrap();
    builder.add_edge("a", "b").unwrap();

    let flow = builder.build().unwrap();
    let failure = flow.run(vec![0]).await.unwrap_err();

    assert_eq!(
        failure.report.node("a").map(|o| o.status),
        Some(NodeStatus::Failed)
    );
    // b's layer was never scheduled.
    assert_eq!(
        failure.report.node("b").map(|o| o.status),
        Some(NodeStatus::Pending)
    );
    assert!(failure.compensation.outcomes.is_empty());
}

#[tokio::test]
async fn test_redeclared_edge_does_not_duplicate_inputs() {
    init_tracing();
    let mut builder = FlowBuilder::new();
    builder.add_action(add("a", 41)).unwrap();
    builder.add_action(add("b", 0)).unwrap();
    builder.add_edge("a", "b").unwrap();
    builder.add_edge("a", "b").unwrap();

    let flow = builder.build().unwrap();
    let outputs = flow.run(vec![0]).await.unwrap();
    // b sees a's result exactly once, not once per declared edge.
    assert_eq!(outputs, vec![41]);
}
