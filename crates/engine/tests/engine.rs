//! End-to-end tests through the `WorkflowEngine` facade, using the mock
//! capabilities from `steps::mock`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use engine::{
    EngineConfig, EngineError, ExecutionStatus, PersistenceError, PersistenceHook, Trigger,
    Workflow, WorkflowDefinition, WorkflowEngine, STEP_LIMIT_EXCEEDED,
};
use serde_json::{json, Value};
use steps::mock::{MockAction, MockWebhook, RecordingSink, VirtualClock};
use steps::{ActionHandler, Capabilities, CapabilityError, Condition, Step, StepKind, StepStatus};
use uuid::Uuid;

fn notify(id: &str, message: &str) -> Step {
    Step::new(id, StepKind::Notification, json!({ "message": message }))
}

fn engine_with_sink() -> (WorkflowEngine, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let caps = Capabilities::new().with_notifications(sink.clone());
    (WorkflowEngine::new(caps, EngineConfig::default()), sink)
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_and_list_workflows() {
    let (engine, _) = engine_with_sink();
    let wf = engine
        .register_workflow(WorkflowDefinition::new(
            "welcome",
            Trigger::on("candidate.created"),
            vec![notify("s1", "hi")],
        ))
        .await
        .unwrap();

    assert!(wf.is_active);
    assert_eq!(engine.get_workflow(wf.id).await, Some(wf.clone()));
    assert_eq!(engine.list_workflows().await, vec![wf]);
}

#[tokio::test]
async fn dangling_successor_is_rejected_at_registration() {
    let (engine, _) = engine_with_sink();
    let result = engine
        .register_workflow(WorkflowDefinition::new(
            "broken",
            Trigger::on("x"),
            vec![notify("s1", "hi").on_error("ghost")],
        ))
        .await;

    match result {
        Err(EngineError::UnknownStepReference { step_id, reference, .. }) => {
            assert_eq!(step_id, "s1");
            assert_eq!(reference, "ghost");
        }
        other => panic!("expected UnknownStepReference, got {other:?}"),
    }
    assert!(engine.list_workflows().await.is_empty());
}

#[tokio::test]
async fn workflow_definition_parses_from_json() {
    let def: WorkflowDefinition = serde_json::from_value(json!({
        "name": "welcome",
        "trigger": { "event": "candidate.created", "conditions": [] },
        "steps": [
            { "id": "s1", "type": "notification", "config": { "message": "New: {{firstName}}" } }
        ]
    }))
    .unwrap();

    assert!(def.is_active);
    assert_eq!(def.steps[0].kind, StepKind::Notification);
    assert!(def.steps[0].next_step_id.is_none());
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn candidate_created_renders_notification() {
    let (engine, sink) = engine_with_sink();
    let def: WorkflowDefinition = serde_json::from_value(json!({
        "name": "announce",
        "trigger": { "event": "candidate.created", "conditions": [] },
        "steps": [
            { "id": "s1", "type": "notification", "config": { "message": "New: {{firstName}}" } }
        ]
    }))
    .unwrap();
    engine.register_workflow(def).await.unwrap();

    let executions = engine
        .dispatch_event("candidate.created", json!({ "firstName": "Ana" }))
        .await
        .unwrap();

    assert_eq!(executions.len(), 1);
    let exec = &executions[0];
    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.step_results.len(), 1);
    assert_eq!(exec.step_results[0].output["message"], "New: Ana");
    assert_eq!(sink.messages(), vec!["New: Ana"]);
}

#[tokio::test]
async fn empty_conditions_match_every_active_workflow_for_the_event() {
    let (engine, sink) = engine_with_sink();
    for name in ["one", "two"] {
        engine
            .register_workflow(WorkflowDefinition::new(name, Trigger::on("order.placed"), vec![notify("s", name)]))
            .await
            .unwrap();
    }
    engine
        .register_workflow(WorkflowDefinition::new("other", Trigger::on("order.shipped"), vec![notify("s", "other")]))
        .await
        .unwrap();
    engine
        .register_workflow(
            WorkflowDefinition::new("off", Trigger::on("order.placed"), vec![notify("s", "off")]).inactive(),
        )
        .await
        .unwrap();

    let executions = engine.dispatch_event("order.placed", json!({})).await.unwrap();

    assert_eq!(executions.len(), 2);
    assert!(executions.iter().all(|e| e.status == ExecutionStatus::Completed));
    let mut messages = sink.messages();
    messages.sort();
    assert_eq!(messages, vec!["one", "two"]);
}

#[tokio::test]
async fn trigger_conditions_gate_dispatch() {
    let (engine, _) = engine_with_sink();
    engine
        .register_workflow(WorkflowDefinition::new(
            "vip",
            Trigger::on("order.placed")
                .when(Condition::greater_than("total", 100.0))
                .when(Condition::equals("currency", json!("EUR"))),
            vec![notify("s", "big order")],
        ))
        .await
        .unwrap();

    let hit = engine
        .dispatch_event("order.placed", json!({ "total": 250, "currency": "EUR" }))
        .await
        .unwrap();
    let miss = engine
        .dispatch_event("order.placed", json!({ "total": 250 }))
        .await
        .unwrap();

    assert_eq!(hit.len(), 1);
    assert!(miss.is_empty());
}

#[tokio::test]
async fn dispatch_with_no_match_returns_nothing() {
    let (engine, _) = engine_with_sink();
    assert!(engine.dispatch_event("nothing.here", json!({})).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// trigger_workflow
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn linear_action_delay_notification_completes() {
    let sink = Arc::new(RecordingSink::new());
    let action = Arc::new(MockAction::returning(json!({ "id": "c-1" })));
    let caps = Capabilities::new()
        .with_action("create_contact", action.clone())
        .with_notifications(sink.clone());
    let engine = WorkflowEngine::new(caps, EngineConfig::default());

    let wf = engine
        .register_workflow(WorkflowDefinition::new(
            "linear",
            Trigger::on("manual"),
            vec![
                Step::new("create", StepKind::Action, json!({ "action": "create_contact", "params": { "name": "{{name}}" } }))
                    .then("wait"),
                Step::new("wait", StepKind::Delay, json!({ "delayMs": 5_000 })).then("tell"),
                notify("tell", "created {{steps.create.id}}"),
            ],
        ))
        .await
        .unwrap();

    let exec = engine
        .trigger_workflow(wf.id, json!({ "name": "Ana" }))
        .await
        .unwrap()
        .expect("active workflow runs");

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.step_results.len(), 3);
    assert!(exec.step_results.iter().all(|r| r.status == StepStatus::Success));
    assert_eq!(exec.step_results[1].output, json!({ "delayedMs": 5_000 }));
    assert_eq!(action.calls(), vec![json!({ "name": "Ana" })]);
    assert_eq!(sink.messages(), vec!["created c-1"]);
}

#[tokio::test]
async fn error_successor_decides_final_status() {
    let sink = Arc::new(RecordingSink::new());
    let caps = Capabilities::new()
        .with_action("charge", Arc::new(MockAction::failing_fatal("card declined")))
        .with_notifications(sink.clone());
    let engine = WorkflowEngine::new(caps, EngineConfig::default());

    let wf = engine
        .register_workflow(WorkflowDefinition::new(
            "charge",
            Trigger::on("manual"),
            vec![
                Step::new("step_1", StepKind::Action, json!({ "action": "charge" })).on_error("step_2"),
                notify("step_2", "charge failed"),
            ],
        ))
        .await
        .unwrap();

    let exec = engine.trigger_workflow(wf.id, json!({})).await.unwrap().unwrap();

    assert_eq!(exec.visited(), vec!["step_1", "step_2"]);
    assert_eq!(exec.step_results[0].status, StepStatus::Failure);
    assert_eq!(exec.step_results[1].status, StepStatus::Success);
    assert_eq!(exec.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn failing_error_successor_fails_execution() {
    let caps = Capabilities::new()
        .with_action("charge", Arc::new(MockAction::failing_fatal("card declined")))
        .with_notifications(Arc::new(RecordingSink::unavailable()));
    let engine = WorkflowEngine::new(caps, EngineConfig::default());

    let wf = engine
        .register_workflow(WorkflowDefinition::new(
            "charge",
            Trigger::on("manual"),
            vec![
                Step::new("step_1", StepKind::Action, json!({ "action": "charge" })).on_error("step_2"),
                notify("step_2", "charge failed"),
            ],
        ))
        .await
        .unwrap();

    let exec = engine.trigger_workflow(wf.id, json!({})).await.unwrap().unwrap();

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert!(exec.error.as_deref().unwrap().starts_with("step 'step_2' failed"));
}

#[tokio::test]
async fn step_cycle_terminates_with_step_limit() {
    let (engine, sink) = engine_with_sink();
    let wf = engine
        .register_workflow(WorkflowDefinition::new(
            "loop",
            Trigger::on("manual"),
            vec![notify("A", "a").then("B"), notify("B", "b").then("A")],
        ))
        .await
        .unwrap();

    let exec = engine.trigger_workflow(wf.id, json!({})).await.unwrap().unwrap();

    assert_eq!(exec.status, ExecutionStatus::Failed);
    assert!(exec.error.as_deref().unwrap().starts_with(STEP_LIMIT_EXCEEDED));
    assert_eq!(exec.step_results.len(), engine.config().max_steps_per_execution);
    assert_eq!(sink.messages().len(), 1000);
}

#[tokio::test]
async fn absent_or_inactive_workflow_is_not_applicable() {
    let (engine, _) = engine_with_sink();
    let wf = engine
        .register_workflow(WorkflowDefinition::new("w", Trigger::on("e"), vec![notify("s", "x")]).inactive())
        .await
        .unwrap();

    assert!(engine.trigger_workflow(wf.id, json!({})).await.unwrap().is_none());
    assert!(engine.trigger_workflow(Uuid::new_v4(), json!({})).await.unwrap().is_none());

    engine.set_workflow_active(wf.id, true).await.unwrap();
    assert!(engine.trigger_workflow(wf.id, json!({})).await.unwrap().is_some());
}

#[tokio::test]
async fn webhook_step_posts_execution_payload() {
    let hook = Arc::new(MockWebhook::responding(200, json!({ "ok": true })));
    let caps = Capabilities::new().with_webhook(hook.clone());
    let engine = WorkflowEngine::new(caps, EngineConfig::default());

    let wf = engine
        .register_workflow(WorkflowDefinition::new(
            "hook",
            Trigger::on("manual"),
            vec![Step::new("post", StepKind::Webhook, json!({ "url": "https://example.test/{{team}}" }))],
        ))
        .await
        .unwrap();

    let exec = engine.trigger_workflow(wf.id, json!({ "team": "core" })).await.unwrap().unwrap();

    assert_eq!(exec.status, ExecutionStatus::Completed);
    assert_eq!(exec.step_results[0].output["status"], 200);
    let requests = hook.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://example.test/core");
    assert_eq!(requests[0].payload["executionId"], json!(exec.id));
    assert_eq!(requests[0].payload["trigger"], json!({ "team": "core" }));
}

// ---------------------------------------------------------------------------
// Concurrency and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_during_delay_stops_the_execution() {
    let clock = Arc::new(VirtualClock::new());
    let sink = Arc::new(RecordingSink::new());
    let engine = WorkflowEngine::builder()
        .capabilities(Capabilities::new().with_notifications(sink.clone()))
        .clock(clock.clone())
        .build();

    let wf = engine
        .register_workflow(WorkflowDefinition::new(
            "slow",
            Trigger::on("manual"),
            vec![
                Step::new("wait", StepKind::Delay, json!({ "delayMs": 3_600_000 })).then("tell"),
                notify("tell", "done"),
            ],
        ))
        .await
        .unwrap();

    let handle = engine.start_workflow(wf.id, json!({})).await.unwrap();
    while clock.pending_sleeps() == 0 {
        tokio::task::yield_now().await;
    }

    let running = engine.get_execution(handle.id()).await.unwrap();
    assert_eq!(running.status, ExecutionStatus::Running);
    assert_eq!(running.current_step_id.as_deref(), Some("wait"));

    assert!(engine.cancel_execution(handle.id()).await);
    let exec = handle.wait().await.unwrap();

    assert_eq!(exec.status, ExecutionStatus::Cancelled);
    assert!(exec.step_results.is_empty());
    assert!(sink.messages().is_empty());
    assert!(!engine.cancel_execution(exec.id).await);
}

#[tokio::test]
async fn delayed_executions_do_not_block_each_other() {
    let clock = Arc::new(VirtualClock::new());
    let sink = Arc::new(RecordingSink::new());
    let engine = WorkflowEngine::builder()
        .capabilities(Capabilities::new().with_notifications(sink.clone()))
        .clock(clock.clone())
        .build();

    let slow = engine
        .register_workflow(WorkflowDefinition::new(
            "slow",
            Trigger::on("manual"),
            vec![
                Step::new("wait", StepKind::Delay, json!({ "delayMs": 60_000 })).then("tell"),
                notify("tell", "slow"),
            ],
        ))
        .await
        .unwrap();
    let fast = engine
        .register_workflow(WorkflowDefinition::new("fast", Trigger::on("manual"), vec![notify("tell", "fast")]))
        .await
        .unwrap();

    let slow_handle = engine.start_workflow(slow.id, json!({})).await.unwrap();
    while clock.pending_sleeps() == 0 {
        tokio::task::yield_now().await;
    }

    let fast_exec = engine.trigger_workflow(fast.id, json!({})).await.unwrap().unwrap();
    assert_eq!(fast_exec.status, ExecutionStatus::Completed);
    assert_eq!(sink.messages(), vec!["fast"]);

    clock.advance(Duration::from_secs(60));
    let slow_exec = slow_handle.wait().await.unwrap();
    assert_eq!(slow_exec.status, ExecutionStatus::Completed);
    assert_eq!(sink.messages(), vec!["fast", "slow"]);
}

#[tokio::test]
async fn list_executions_filters_by_workflow() {
    let (engine, _) = engine_with_sink();
    let a = engine
        .register_workflow(WorkflowDefinition::new("a", Trigger::on("e"), vec![notify("s", "a")]))
        .await
        .unwrap();
    let b = engine
        .register_workflow(WorkflowDefinition::new("b", Trigger::on("e"), vec![notify("s", "b")]))
        .await
        .unwrap();

    engine.trigger_workflow(a.id, json!({})).await.unwrap();
    engine.trigger_workflow(a.id, json!({})).await.unwrap();
    engine.trigger_workflow(b.id, json!({})).await.unwrap();

    assert_eq!(engine.list_executions(None).await.len(), 3);
    assert_eq!(engine.list_executions(Some(a.id)).await.len(), 2);
    assert!(engine
        .list_executions(Some(b.id))
        .await
        .iter()
        .all(|e| e.workflow_id == b.id && e.is_terminal()));
}

#[tokio::test]
async fn removing_a_workflow_keeps_its_history() {
    let (engine, _) = engine_with_sink();
    let wf = engine
        .register_workflow(WorkflowDefinition::new("w", Trigger::on("e"), vec![notify("s", "x")]))
        .await
        .unwrap();
    let exec = engine.trigger_workflow(wf.id, json!({})).await.unwrap().unwrap();

    assert!(engine.remove_workflow(wf.id).await);
    assert!(!engine.remove_workflow(wf.id).await);
    assert!(engine.get_workflow(wf.id).await.is_none());
    assert_eq!(engine.get_execution(exec.id).await, Some(exec));
}

struct PanickingAction;

#[async_trait]
impl ActionHandler for PanickingAction {
    async fn call(&self, _params: Value) -> Result<Value, CapabilityError> {
        panic!("handler blew up");
    }
}

#[tokio::test]
async fn panicking_action_fails_its_execution_only() {
    let sink = Arc::new(RecordingSink::new());
    let caps = Capabilities::new()
        .with_notifications(sink.clone())
        .with_action("explode", Arc::new(PanickingAction));
    let engine = WorkflowEngine::new(caps, EngineConfig::default());
    let healthy = engine
        .register_workflow(WorkflowDefinition::new("healthy", Trigger::on("e"), vec![notify("s", "ok")]))
        .await
        .unwrap();
    let broken = engine
        .register_workflow(WorkflowDefinition::new(
            "broken",
            Trigger::on("e"),
            vec![Step::new("s", StepKind::Action, json!({ "action": "explode" }))],
        ))
        .await
        .unwrap();

    let executions = engine.dispatch_event("e", json!({})).await.unwrap();

    assert_eq!(executions.len(), 2);
    assert_eq!(executions[0].workflow_id, healthy.id);
    assert_eq!(executions[0].status, ExecutionStatus::Completed);
    assert_eq!(sink.messages(), vec!["ok"]);

    let failed = &executions[1];
    assert_eq!(failed.workflow_id, broken.id);
    assert_eq!(failed.status, ExecutionStatus::Failed);
    assert!(failed.completed_at.is_some());
    let reason = failed.error.as_deref().unwrap_or_default();
    assert!(reason.starts_with("execution aborted"), "{reason}");
    assert!(reason.contains("handler blew up"), "{reason}");

    assert_eq!(engine.get_execution(failed.id).await.as_ref(), Some(failed));
    assert!(!engine.cancel_execution(failed.id).await);
}

#[tokio::test]
async fn history_keeps_only_the_most_recent_finished_executions() {
    let caps = Capabilities::new().with_notifications(Arc::new(RecordingSink::new()));
    let engine = WorkflowEngine::new(
        caps,
        EngineConfig {
            max_retained_executions: 2,
            ..EngineConfig::default()
        },
    );
    let wf = engine
        .register_workflow(WorkflowDefinition::new("w", Trigger::on("e"), vec![notify("s", "x")]))
        .await
        .unwrap();

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(engine.trigger_workflow(wf.id, json!({})).await.unwrap().unwrap().id);
    }

    assert!(engine.get_execution(ids[0]).await.is_none());
    assert!(engine.get_execution(ids[1]).await.is_some());
    assert!(engine.get_execution(ids[2]).await.is_some());
    assert_eq!(engine.list_executions(Some(wf.id)).await.len(), 2);

    assert_eq!(engine.clear_finished_executions().await, 2);
    assert!(engine.list_executions(None).await.is_empty());
}

// ---------------------------------------------------------------------------
// Persistence hook
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingStore {
    saved_workflows: Mutex<Vec<Uuid>>,
    deleted: Mutex<Vec<Uuid>>,
    snapshots: Mutex<Vec<ExecutionStatus>>,
    preloaded: Vec<Workflow>,
}

#[async_trait]
impl PersistenceHook for RecordingStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), PersistenceError> {
        self.saved_workflows.lock().unwrap().push(workflow.id);
        Ok(())
    }

    async fn delete_workflow(&self, id: Uuid) -> Result<(), PersistenceError> {
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }

    async fn save_execution(&self, execution: &engine::Execution) -> Result<(), PersistenceError> {
        self.snapshots.lock().unwrap().push(execution.status);
        Ok(())
    }

    async fn load_workflows(&self) -> Result<Vec<Workflow>, PersistenceError> {
        Ok(self.preloaded.clone())
    }
}

struct BrokenStore;

#[async_trait]
impl PersistenceHook for BrokenStore {
    async fn save_execution(&self, _execution: &engine::Execution) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("disk full".into()))
    }
}

#[tokio::test]
async fn persistence_hook_sees_every_transition() {
    let store = Arc::new(RecordingStore::default());
    let engine = WorkflowEngine::builder()
        .capabilities(Capabilities::new().with_notifications(Arc::new(RecordingSink::new())))
        .persistence(store.clone())
        .build();

    let wf = engine
        .register_workflow(WorkflowDefinition::new("w", Trigger::on("e"), vec![notify("s", "x")]))
        .await
        .unwrap();
    engine.trigger_workflow(wf.id, json!({})).await.unwrap();
    engine.remove_workflow(wf.id).await;

    assert_eq!(*store.saved_workflows.lock().unwrap(), vec![wf.id]);
    assert_eq!(*store.deleted.lock().unwrap(), vec![wf.id]);

    let snapshots = store.snapshots.lock().unwrap().clone();
    assert_eq!(snapshots.first(), Some(&ExecutionStatus::Pending));
    assert!(snapshots.contains(&ExecutionStatus::Running));
    assert_eq!(snapshots.last(), Some(&ExecutionStatus::Completed));
}

#[tokio::test]
async fn persistence_failures_do_not_change_outcomes() {
    let engine = WorkflowEngine::builder()
        .capabilities(Capabilities::new().with_notifications(Arc::new(RecordingSink::new())))
        .persistence(Arc::new(BrokenStore))
        .build();

    let wf = engine
        .register_workflow(WorkflowDefinition::new("w", Trigger::on("e"), vec![notify("s", "x")]))
        .await
        .unwrap();
    let exec = engine.trigger_workflow(wf.id, json!({})).await.unwrap().unwrap();

    assert_eq!(exec.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn restore_reloads_persisted_workflows() {
    let source = WorkflowEngine::new(Capabilities::new(), EngineConfig::default());
    let original = source
        .register_workflow(WorkflowDefinition::new("kept", Trigger::on("e"), vec![notify("s", "x")]))
        .await
        .unwrap();

    let store = Arc::new(RecordingStore {
        preloaded: vec![original.clone()],
        ..Default::default()
    });
    let engine = WorkflowEngine::builder().persistence(store).build();

    assert_eq!(engine.restore().await.unwrap(), 1);
    assert_eq!(engine.get_workflow(original.id).await, Some(original));
}
