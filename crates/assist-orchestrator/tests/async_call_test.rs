//! Integration tests for async calls.

mod common;

use assist_abstraction::Point;
use assist_orchestrator::{CallId, CallRequest, EngineError, MessageKind, RETAINED_CALLS};
use common::{Harness, MockController, ScriptedRecognizer};
use std::time::Duration;

const TASKS: &str = r#"{
    "Loop": { "action": "ClickSelf", "next": ["Loop"] },
    "Once": { "algorithm": "JustReturn" }
}"#;

#[test]
fn test_click_call() {
    let harness = Harness::new(TASKS, ScriptedRecognizer::new());
    let id = harness.engine.async_call(CallRequest::Click(Point::new(5, 6)), false);
    let outcome = harness.engine.wait_call(id).unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.what, "Click");
    assert_eq!(harness.controller.clicks(), vec![Point::new(5, 6)]);

    assert!(harness.sink.wait_kind(MessageKind::AsyncCallInfo));
    let info = &harness.sink.of_kind(MessageKind::AsyncCallInfo)[0];
    assert_eq!(info.details["async_call_id"], id.0);
    assert_eq!(info.details["what"], "Click");
    assert_eq!(info.details["ret"], true);
}

#[test]
fn test_blocking_screencap_call() {
    let harness = Harness::new(TASKS, ScriptedRecognizer::new());
    let id = harness.engine.async_call(CallRequest::Screencap, true);
    let outcome = harness.engine.wait_call(id).unwrap();

    assert!(outcome.ok);
    assert_eq!(outcome.details["width"], 1280);
    assert_eq!(outcome.details["height"], 720);
    assert_eq!(harness.controller.captures(), 1);
}

#[test]
fn test_connect_call_reports_connection() {
    let harness = Harness::with_controller(TASKS, ScriptedRecognizer::new(), MockController::disconnected());
    let id = harness.engine.async_call(CallRequest::Connect, true);
    assert!(harness.engine.wait_call(id).unwrap().ok);

    assert!(harness.sink.wait_kind(MessageKind::ConnectionInfo));
    assert_eq!(harness.sink.of_kind(MessageKind::ConnectionInfo)[0].details["what"], "Connected");

    harness.run_chain("Once");
    assert!(harness.sink.of_kind(MessageKind::InitFailed).is_empty());
}

#[test]
fn test_snapshot_call_after_run() {
    let harness = Harness::new(TASKS, ScriptedRecognizer::new());
    harness.run_chain("Once");
    assert!(harness.wait_idle());

    let id = harness.engine.async_call(CallRequest::Snapshot, true);
    let outcome = harness.engine.wait_call(id).unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.details["exec_times"]["Once"], 1);
}

#[test]
fn test_stop_call_stops_run() {
    let harness = Harness::with_controller(
        TASKS,
        ScriptedRecognizer::new().always("Loop"),
        MockController::with_click_delay(Duration::from_millis(2)),
    );
    harness.engine.append_chain("Loop").unwrap();
    assert!(harness.engine.start(true));
    assert!(harness.sink.wait_for(|events| {
        events.iter().any(|event| event.kind == MessageKind::SubTaskCompleted)
    }));

    let id = harness.engine.async_call(CallRequest::Stop, true);
    assert!(harness.engine.wait_call(id).unwrap().ok);
    assert!(harness.sink.wait_kind(MessageKind::ChainStopped));
    assert!(harness.wait_idle());
}

#[test]
fn test_call_ids_are_distinct() {
    let harness = Harness::new(TASKS, ScriptedRecognizer::new());
    let first = harness.engine.async_call(CallRequest::Snapshot, false);
    let second = harness.engine.async_call(CallRequest::Snapshot, false);
    assert_ne!(first, second);
    assert!(harness.engine.wait_call(first).is_ok());
    assert!(harness.engine.wait_call(second).is_ok());
}

#[test]
fn test_wait_for_unknown_call() {
    let harness = Harness::new(TASKS, ScriptedRecognizer::new());
    let err = harness.engine.wait_call(CallId(999)).unwrap_err();
    assert!(matches!(err, EngineError::UnknownCall(CallId(999))));
}

#[test]
fn test_old_call_outcomes_are_evicted() {
    let harness = Harness::new(TASKS, ScriptedRecognizer::new());
    let first = harness.engine.async_call(CallRequest::Snapshot, true);
    let mut last = first;
    for _ in 0..RETAINED_CALLS {
        last = harness.engine.async_call(CallRequest::Snapshot, true);
    }

    let err = harness.engine.wait_call(first).unwrap_err();
    assert!(matches!(err, EngineError::CallExpired(id) if id == first));
    assert!(harness.engine.wait_call(last).unwrap().ok);
    assert!(harness.engine.wait_call(last).is_ok());
}
