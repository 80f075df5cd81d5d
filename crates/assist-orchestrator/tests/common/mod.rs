//! Shared test utilities for Assist Orchestrator integration tests.
//!
//! Provides a scripted recognizer, an in-memory controller and a sink that
//! records every notification.

#![allow(dead_code)]

use assist_abstraction::{
    ControlError, ControlResult, Controller, Frame, Hit, Point, RecognitionRequest, RecognitionResult,
    Recognizer, Rect,
};
use assist_core::{EngineConfig, TaskStore};
use assist_orchestrator::{Engine, MessageKind, NotificationEvent, NotificationSink};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Rectangle reported for every scripted hit.
pub const HIT_RECT: Rect = Rect::new(100, 100, 40, 20);

/// How long tests wait for the engine before giving up.
pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
enum Script {
    Always,
    Never,
    Sequence(VecDeque<bool>, bool),
    Panic,
}

/// Recognizer driven by a per-task script. Unscripted tasks are never found.
#[derive(Default)]
pub struct ScriptedRecognizer {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name` is recognized on every attempt.
    pub fn always(self, name: &str) -> Self {
        self.script(name, Script::Always)
    }

    /// `name` is never recognized.
    pub fn never(self, name: &str) -> Self {
        self.script(name, Script::Never)
    }

    /// `name` follows `results`, then `then` forever.
    pub fn sequence(self, name: &str, results: &[bool], then: bool) -> Self {
        self.script(name, Script::Sequence(results.iter().copied().collect(), then))
    }

    /// Recognizing `name` panics.
    pub fn panics(self, name: &str) -> Self {
        self.script(name, Script::Panic)
    }

    fn script(self, name: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(name.to_string(), script);
        self
    }

    /// Number of times `name` was evaluated.
    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl Recognizer for ScriptedRecognizer {
    fn recognize(&self, _frame: &Frame, request: RecognitionRequest<'_>) -> RecognitionResult<Option<Hit>> {
        *self.calls.lock().unwrap().entry(request.task.to_string()).or_insert(0) += 1;
        let found = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(request.task) {
                None | Some(Script::Never) => Some(false),
                Some(Script::Always) => Some(true),
                Some(Script::Sequence(results, then)) => Some(results.pop_front().unwrap_or(*then)),
                Some(Script::Panic) => None,
            }
        };
        match found {
            Some(found) => Ok(found.then(|| Hit::new(HIT_RECT, 0.9))),
            None => panic!("scripted recognizer panic for {}", request.task),
        }
    }
}

/// In-memory device that records input.
pub struct MockController {
    connected: AtomicBool,
    fail_clicks: AtomicBool,
    click_delay: Duration,
    captures: AtomicUsize,
    clicks: Mutex<Vec<Point>>,
    swipes: Mutex<Vec<(Point, Point)>>,
}

impl MockController {
    pub fn new() -> Self {
        Self::with_click_delay(Duration::ZERO)
    }

    /// A controller whose clicks take `delay`.
    pub fn with_click_delay(delay: Duration) -> Self {
        Self {
            connected: AtomicBool::new(true),
            fail_clicks: AtomicBool::new(false),
            click_delay: delay,
            captures: AtomicUsize::new(0),
            clicks: Mutex::new(Vec::new()),
            swipes: Mutex::new(Vec::new()),
        }
    }

    pub fn disconnected() -> Self {
        let controller = Self::new();
        controller.connected.store(false, Ordering::SeqCst);
        controller
    }

    pub fn fail_clicks(&self, fail: bool) {
        self.fail_clicks.store(fail, Ordering::SeqCst);
    }

    pub fn clicks(&self) -> Vec<Point> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn click_count(&self) -> usize {
        self.clicks.lock().unwrap().len()
    }

    pub fn swipes(&self) -> Vec<(Point, Point)> {
        self.swipes.lock().unwrap().clone()
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Controller for MockController {
    fn connect(&self) -> ControlResult<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn screencap(&self) -> ControlResult<Frame> {
        if !self.connected() {
            return Err(ControlError::NotConnected);
        }
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(Frame::new(1280, 720, vec![0u8; 16]))
    }

    fn click(&self, point: Point) -> ControlResult<()> {
        if self.fail_clicks.load(Ordering::SeqCst) {
            return Err(ControlError::InputRejected("scripted failure".to_string()));
        }
        if !self.click_delay.is_zero() {
            std::thread::sleep(self.click_delay);
        }
        self.clicks.lock().unwrap().push(point);
        Ok(())
    }

    fn swipe(&self, from: Point, to: Point, _duration: Duration) -> ControlResult<()> {
        self.swipes.lock().unwrap().push((from, to));
        Ok(())
    }
}

/// Sink that keeps every event and lets tests wait for one.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
    arrived: Condvar,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<MessageKind> {
        self.events().iter().map(|event| event.kind).collect()
    }

    /// Events of `kind`, in arrival order.
    pub fn of_kind(&self, kind: MessageKind) -> Vec<NotificationEvent> {
        self.events().into_iter().filter(|event| event.kind == kind).collect()
    }

    /// Task names of `kind` events, in arrival order.
    pub fn tasks(&self, kind: MessageKind) -> Vec<String> {
        self.of_kind(kind).into_iter().filter_map(|event| event.task).collect()
    }

    /// Waits until `predicate` holds for the recorded events.
    pub fn wait_for(&self, predicate: impl Fn(&[NotificationEvent]) -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        let mut events = self.events.lock().unwrap();
        while !predicate(&events) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = self.arrived.wait_timeout(events, deadline - now).unwrap().0;
        }
        true
    }

    /// Waits until an event of `kind` arrives.
    pub fn wait_kind(&self, kind: MessageKind) -> bool {
        self.wait_for(|events| events.iter().any(|event| event.kind == kind))
    }
}

impl NotificationSink for RecordingSink {
    fn on_event(&self, event: &NotificationEvent) {
        self.events.lock().unwrap().push(event.clone());
        self.arrived.notify_all();
    }
}

/// Polls `condition` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    true
}

/// Config with short delays and a fixed seed.
pub fn fast_config() -> EngineConfig {
    EngineConfig { retry_delay_ms: 1, checkpoint_interval_ms: 1, rng_seed: Some(42), ..EngineConfig::default() }
}

/// An engine over `definitions` plus handles to its collaborators.
pub struct Harness {
    pub engine: Engine,
    pub controller: Arc<MockController>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(definitions: &str, recognizer: ScriptedRecognizer) -> Self {
        Self::with_controller(definitions, recognizer, MockController::new())
    }

    pub fn with_controller(definitions: &str, recognizer: ScriptedRecognizer, controller: MockController) -> Self {
        let store = Arc::new(TaskStore::from_json_str(definitions).expect("valid definitions"));
        let controller = Arc::new(controller);
        let recognizer = Arc::new(recognizer);
        let sink = Arc::new(RecordingSink::new());
        let engine = Engine::new(
            store,
            Arc::clone(&controller) as Arc<dyn Controller>,
            Arc::clone(&recognizer) as Arc<dyn Recognizer>,
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            fast_config(),
        )
        .expect("engine starts");
        Self { engine, controller, recognizer, sink }
    }

    /// Polls until the engine reports it is idle.
    pub fn wait_idle(&self) -> bool {
        wait_until(|| !self.engine.running())
    }

    /// Queues `entry`, starts, and waits for the run to finish.
    pub fn run_chain(&self, entry: &str) {
        self.engine.append_chain(entry).expect("known entry");
        assert!(self.engine.start(true));
        assert!(self.sink.wait_kind(MessageKind::AllTasksCompleted), "run did not finish");
    }
}
