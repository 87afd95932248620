//! End-to-end scenario tests over the Run Controller (spec.md §8 S1-S6):
//! one workflow definition per scenario, driven through the same public
//! surface a caller uses (`register_workflow`/`start_run`/`partial_run`/
//! `resume_paused`), asserting on the run's final status/outputs and, where
//! the scenario is specifically about cancellation bookkeeping, on the
//! individual task rows a unit test inside `scheduler::executor` can't see
//! (those only exercise the scheduler's internals directly; these drive it
//! the way `RunController` actually does).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use pyspur_core::llm::NullChatModel;
use pyspur_core::registry::NodeRegistry;
use pyspur_core::scheduler::ConcurrencyLimits;
use pyspur_engine::RunController;
use pyspur_store::memory::InMemoryTaskStore;
use pyspur_store::{CancelReason, Link, Node, ResumeAction, Run, RunStatus, RunType, SpurType, TaskStatus, TaskStore, WorkflowDefinition};

fn registry() -> Arc<NodeRegistry> {
    let mut registry = NodeRegistry::new();
    pyspur_nodes::register_builtins(&mut registry, Arc::new(NullChatModel::new()));
    Arc::new(registry)
}

fn new_controller() -> (Arc<RunController>, Arc<dyn TaskStore>) {
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    (RunController::new(store.clone(), registry(), ConcurrencyLimits::default(), None), store)
}

fn node(id: &str, node_type: &str, config: Value) -> Node {
    Node {
        id: id.into(),
        title: id.into(),
        node_type: node_type.into(),
        config: config.as_object().cloned().unwrap_or_default(),
        coordinates: None,
        parent_id: None,
        subworkflow: None,
    }
}

fn link(source: &str, target: &str, source_handle: Option<&str>, target_handle: Option<&str>) -> Link {
    Link {
        source_id: source.into(),
        target_id: target.into(),
        source_handle: source_handle.map(str::to_string),
        target_handle: target_handle.map(str::to_string),
    }
}

async fn wait_for_terminal(controller: &Arc<RunController>, run_id: uuid::Uuid) -> Run {
    for _ in 0..400 {
        let status = controller.get_run_status(run_id).await.unwrap();
        if status.run.status.is_terminal() || status.run.status == RunStatus::Paused {
            return status.run;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {run_id} did not reach a terminal state in time");
}

/// S1: a straight Input -> PythonFunc -> Output line. The canonical case:
/// exactly one real predecessor at every hop, so OutputNode must flatten
/// past the scheduler's reserved `"input"` echo rather than keying by it.
#[tokio::test]
async fn s1_straight_line_flattens_to_the_producers_bare_output() {
    let (controller, _store) = new_controller();
    let definition = WorkflowDefinition {
        nodes: vec![
            node("in", "Input", json!({})),
            node("double", "PythonFunc", json!({"outputs": {"y": "input.x * 2"}})),
            node("out", "Output", json!({})),
        ],
        links: vec![
            link("in", "double", None, Some("input")),
            link("double", "out", None, None),
        ],
        test_inputs: vec![],
        spur_type: SpurType::Workflow,
    };
    let workflow = controller.register_workflow("s1", None, definition).await.unwrap();

    let run = controller.start_run(workflow.id, json!({"x": 3}), RunType::Interactive).await.unwrap();
    let finished = wait_for_terminal(&controller, run.id).await;

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.outputs, Some(json!({"y": 6.0})));
}

/// S2: a router's losing branch is canceled outright, never dispatched
/// with a null input, and doesn't block the run from completing. The
/// winning branch's OutputNode sees the router's bare pass-through value,
/// not the pass-through double-nested under the reserved `"input"` key.
#[tokio::test]
async fn s2_router_cancels_the_losing_branch_and_completes_on_the_winner() {
    let (controller, store) = new_controller();
    let definition = WorkflowDefinition {
        nodes: vec![
            node("in", "Input", json!({})),
            node(
                "router",
                "Router",
                json!({"route_map": {
                    "pos": {"conditions": [{"variable": "input.n", "operator": "greater_than", "value": 0}]},
                    "neg": {"conditions": [{"variable": "input.n", "operator": "less_than", "value": 0}]},
                }}),
            ),
            node("pos", "Output", json!({})),
            node("neg", "Output", json!({})),
        ],
        links: vec![
            link("in", "router", None, Some("input")),
            link("router", "pos", Some("pos"), None),
            link("router", "neg", Some("neg"), None),
        ],
        test_inputs: vec![],
        spur_type: SpurType::Workflow,
    };
    let workflow = controller.register_workflow("s2", None, definition).await.unwrap();

    let run = controller.start_run(workflow.id, json!({"n": 5}), RunType::Interactive).await.unwrap();
    let finished = wait_for_terminal(&controller, run.id).await;

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.outputs, Some(json!({"n": 5})));

    let neg_task = store.get_task(run.id, "neg", None).await.unwrap().expect("neg task recorded");
    assert_eq!(neg_task.status, TaskStatus::Canceled);
    assert_eq!(neg_task.cancel_reason, Some(CancelReason::Skipped));
    let pos_task = store.get_task(run.id, "pos", None).await.unwrap().expect("pos task recorded");
    assert_eq!(pos_task.status, TaskStatus::Completed);
}

/// S3: a ForLoop node fans a subworkflow out over an array input and
/// aggregates each iteration's single-output-node result back in the
/// iterable's own order.
#[tokio::test]
async fn s3_for_loop_aggregates_subworkflow_outputs_in_order() {
    let (controller, _store) = new_controller();
    let subworkflow = WorkflowDefinition {
        nodes: vec![
            node("sub_in", "Input", json!({})),
            node("sub_fn", "PythonFunc", json!({"outputs": {"v": "input.item + 1"}})),
            node("sub_out", "Output", json!({})),
        ],
        links: vec![
            link("sub_in", "sub_fn", None, Some("input")),
            link("sub_fn", "sub_out", None, None),
        ],
        test_inputs: vec![],
        spur_type: SpurType::Workflow,
    };
    let mut loop_node = node("loop", "ForLoop", json!({"iterable": "xs"}));
    loop_node.subworkflow = Some(Box::new(subworkflow));

    let definition = WorkflowDefinition {
        nodes: vec![node("in", "Input", json!({})), loop_node, node("out", "Output", json!({}))],
        links: vec![link("in", "loop", Some("xs"), Some("xs")), link("loop", "out", None, None)],
        test_inputs: vec![],
        spur_type: SpurType::Workflow,
    };
    let workflow = controller.register_workflow("s3", None, definition).await.unwrap();

    let run = controller.start_run(workflow.id, json!({"xs": [1, 2, 3]}), RunType::Interactive).await.unwrap();
    let finished = wait_for_terminal(&controller, run.id).await;

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.outputs, Some(json!({"result": [{"v": 2.0}, {"v": 3.0}, {"v": 4.0}]})));
}

/// S4: a HumanIntervention node always pauses the run; resuming with
/// `Override` substitutes the resume call's inputs as that node's output
/// and drives the scope to completion synchronously.
#[tokio::test]
async fn s4_human_intervention_pauses_then_completes_on_override_resume() {
    let (controller, _store) = new_controller();
    let definition = WorkflowDefinition {
        nodes: vec![
            node("in", "Input", json!({})),
            node("hil", "HumanIntervention", json!({"message": "needs approval"})),
            node("out", "Output", json!({})),
        ],
        links: vec![link("in", "hil", None, None), link("hil", "out", None, None)],
        test_inputs: vec![],
        spur_type: SpurType::Workflow,
    };
    let workflow = controller.register_workflow("s4", None, definition).await.unwrap();

    let run = controller.start_run(workflow.id, json!({}), RunType::Interactive).await.unwrap();
    let paused = wait_for_terminal(&controller, run.id).await;
    assert_eq!(paused.status, RunStatus::Paused);

    let resumed = controller
        .resume_paused(run.id, ResumeAction::Override, Some(json!({"msg": "ok"})), None, None)
        .await
        .unwrap();

    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(resumed.outputs, Some(json!({"msg": "ok"})));
}

/// S5: `partial_run` reruns only a target node, seeding its declared
/// predecessor from a caller-supplied value instead of recomputing it —
/// the predecessor never actually runs and is not an upstream failure.
#[tokio::test]
async fn s5_partial_run_seeds_the_target_from_a_caller_supplied_predecessor() {
    let (controller, store) = new_controller();
    let definition = WorkflowDefinition {
        nodes: vec![
            node("a", "Input", json!({})),
            node("b", "PythonFunc", json!({"outputs": {"y": "input.x * 2"}})),
            node("c", "Output", json!({})),
        ],
        links: vec![link("a", "b", None, Some("input")), link("b", "c", None, None)],
        test_inputs: vec![],
        spur_type: SpurType::Workflow,
    };
    let workflow = controller.register_workflow("s5", None, definition).await.unwrap();

    let mut partial_outputs = HashMap::new();
    partial_outputs.insert("b".to_string(), json!({"y": 42}));
    let result = controller.partial_run(workflow.id, "c", json!({}), partial_outputs, false).await.unwrap();

    assert_eq!(result, json!({"y": 42}));

    let runs = controller.list_workflow_runs(workflow.id, pyspur_store::Page::default()).await.unwrap();
    let run = runs.into_iter().find(|r| r.run_type == RunType::Partial).expect("partial run recorded");
    assert_eq!(run.status, RunStatus::Completed);

    let a_task = store.get_task(run.id, "a", None).await.unwrap();
    assert!(a_task.is_none(), "predecessor outside the rerun target should never be dispatched");
    let b_task = store.get_task(run.id, "b", None).await.unwrap().expect("injected predecessor row recorded");
    assert_eq!(b_task.cancel_reason, Some(CancelReason::PartialInput));
}

/// S6: a node failure cascades to its dependents as `UpstreamFailed`
/// without touching a sibling branch that doesn't depend on it; the run
/// as a whole still fails since not every OutputNode completed.
#[tokio::test]
async fn s6_a_failed_node_cascades_to_its_dependents_but_not_a_sibling_branch() {
    let (controller, store) = new_controller();
    let definition = WorkflowDefinition {
        nodes: vec![
            node("in", "Input", json!({})),
            node("b", "PythonFunc", json!({"outputs": {"y": "input.x +"}})),
            node("c", "Output", json!({})),
            node("d", "Output", json!({})),
        ],
        links: vec![
            link("in", "b", None, Some("input")),
            link("in", "c", None, None),
            link("b", "d", None, None),
        ],
        test_inputs: vec![],
        spur_type: SpurType::Workflow,
    };
    let workflow = controller.register_workflow("s6", None, definition).await.unwrap();

    let run = controller.start_run(workflow.id, json!({"x": 1}), RunType::Interactive).await.unwrap();
    let finished = wait_for_terminal(&controller, run.id).await;

    assert_eq!(finished.status, RunStatus::Failed);

    let b_task = store.get_task(run.id, "b", None).await.unwrap().expect("b task recorded");
    assert_eq!(b_task.status, TaskStatus::Failed);
    let d_task = store.get_task(run.id, "d", None).await.unwrap().expect("d task recorded");
    assert_eq!(d_task.status, TaskStatus::Canceled);
    assert_eq!(d_task.cancel_reason, Some(CancelReason::UpstreamFailed));
    let c_task = store.get_task(run.id, "c", None).await.unwrap().expect("c task recorded");
    assert_eq!(c_task.status, TaskStatus::Completed);
    assert_eq!(c_task.outputs, Some(json!({"x": 1})));
}
