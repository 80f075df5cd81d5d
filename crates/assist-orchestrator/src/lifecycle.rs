//! Engine lifecycle management.
//!
//! An [`Engine`] owns three threads: the worker that runs the execution
//! cycle, the handler for async calls, and the consumer that delivers
//! notifications. The engine moves between `Idle` and `Running` on
//! [`Engine::start`] and [`Engine::stop`], and exits when dropped.

use crate::calls::{CallHandler, CallId, CallLog, CallOutcome, CallRequest};
use crate::cycle::Worker;
use crate::error::{EngineError, Result};
use crate::notification::{self, NotificationSink, Notifier};
use crate::run_state::{ChainId, RunSnapshot};
use assist_abstraction::{Controller, Recognizer};
use assist_core::{EngineConfig, TaskStore};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, error, info};
use uuid::Uuid;

/// Whether the worker is draining chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Running,
}

/// A chain waiting to run.
#[derive(Debug, Clone)]
pub(crate) struct ChainRequest {
    pub(crate) id: ChainId,
    pub(crate) entry: String,
}

/// State guarded by the control mutex.
#[derive(Debug)]
pub(crate) struct Control {
    pub(crate) phase: Phase,
    /// Bumped by every accepted start.
    pub(crate) start_epoch: u64,
    /// Last start the worker picked up.
    pub(crate) ack_epoch: u64,
    pub(crate) chains: VecDeque<ChainRequest>,
    next_chain: u64,
}

/// Everything the engine threads share.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) engine_id: Uuid,
    pub(crate) running: AtomicBool,
    pub(crate) interrupt: AtomicBool,
    pub(crate) exit: AtomicBool,
    pub(crate) control: Mutex<Control>,
    /// Signals the worker: a start was accepted or exit was requested.
    pub(crate) wake: Condvar,
    /// Signals callers: the worker picked up a start or went idle.
    pub(crate) ack: Condvar,
    pub(crate) snapshot: RwLock<RunSnapshot>,
    pub(crate) calls: Mutex<CallLog>,
    pub(crate) call_done: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            engine_id: Uuid::new_v4(),
            running: AtomicBool::new(false),
            interrupt: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            control: Mutex::new(Control {
                phase: Phase::Idle,
                start_epoch: 0,
                ack_epoch: 0,
                chains: VecDeque::new(),
                next_chain: 1,
            }),
            wake: Condvar::new(),
            ack: Condvar::new(),
            snapshot: RwLock::new(RunSnapshot::default()),
            calls: Mutex::new(CallLog::default()),
            call_done: Condvar::new(),
        }
    }

    pub(crate) fn exiting(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    /// Raises the interrupt flag and drops queued chains without waiting.
    pub(crate) fn request_stop(&self) {
        self.interrupt.store(true, Ordering::Release);
        let mut control = lock(&self.control);
        let dropped = control.chains.len();
        control.chains.clear();
        debug!(dropped_chains = dropped, "Stop requested");
    }

    pub(crate) fn publish(&self, snapshot: RunSnapshot) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub(crate) fn read_snapshot(&self) -> RunSnapshot {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Waits on a condition variable, tolerating poison like [`lock`].
pub(crate) fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

/// A task-chain engine bound to one device.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use assist_orchestrator::{Engine, FnSink};
/// # use assist_core::{EngineConfig, TaskStore};
/// # fn demo(
/// #     controller: Arc<dyn assist_abstraction::Controller>,
/// #     recognizer: Arc<dyn assist_abstraction::Recognizer>,
/// # ) -> assist_orchestrator::Result<()> {
/// let store = Arc::new(TaskStore::from_json_str(r#"{"Start": {"algorithm": "JustReturn"}}"#)?);
/// let sink = Arc::new(FnSink(|event: &assist_orchestrator::NotificationEvent| println!("{}", event.to_json())));
/// let engine = Engine::new(store, controller, recognizer, sink, EngineConfig::default())?;
/// engine.append_chain("Start")?;
/// engine.start(true);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    shared: Arc<Shared>,
    store: Arc<TaskStore>,
    call_tx: Option<UnboundedSender<(CallId, CallRequest)>>,
    next_call: AtomicU64,
    worker: Option<JoinHandle<()>>,
    call_thread: Option<JoinHandle<()>>,
    msg_thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.shared.engine_id)
            .field("running", &self.running())
            .field("tasks", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine and spawns its threads. The engine starts idle.
    ///
    /// # Arguments
    /// * `store` - Validated task descriptors
    /// * `controller` - Device the engine drives
    /// * `recognizer` - Perception algorithms
    /// * `sink` - Receiver of every notification
    /// * `config` - Timing and geometry settings
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, a task refers to an
    /// undefined name, or a thread cannot be spawned.
    pub fn new(
        store: Arc<TaskStore>,
        controller: Arc<dyn Controller>,
        recognizer: Arc<dyn Recognizer>,
        sink: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        store.validate()?;

        let shared = Arc::new(Shared::new());
        let (msg_tx, msg_rx) = unbounded_channel();
        let (call_tx, call_rx) = unbounded_channel();

        let mut engine = Self {
            shared: Arc::clone(&shared),
            store: Arc::clone(&store),
            call_tx: Some(call_tx),
            next_call: AtomicU64::new(1),
            worker: None,
            call_thread: None,
            msg_thread: None,
        };
        // Declared after `engine` so an early return drops the last sender
        // before `engine`'s drop joins the message thread.
        let notifier = Notifier::new(shared.engine_id, msg_tx);

        engine.msg_thread = Some(spawn("assist-msg", "message", move || {
            notification::consume(msg_rx, sink.as_ref());
        })?);

        let handler = CallHandler::new(Arc::clone(&shared), Arc::clone(&controller), notifier.clone());
        engine.call_thread = Some(spawn("assist-call", "call", move || handler.run(call_rx))?);

        let worker = Worker::new(shared, store, controller, recognizer, notifier, config);
        engine.worker = Some(spawn("assist-worker", "worker", move || worker.run())?);

        info!(engine = %engine.shared.engine_id, tasks = engine.store.len(), "Engine created");
        Ok(engine)
    }

    /// Engine identity, carried by every notification.
    pub fn id(&self) -> Uuid {
        self.shared.engine_id
    }

    /// Begins draining queued chains.
    ///
    /// Returns `false` if a run is already in progress or the engine is
    /// exiting; counters are left untouched in that case. With `block`,
    /// returns once the worker has picked up the run.
    pub fn start(&self, block: bool) -> bool {
        let mut control = lock(&self.shared.control);
        if control.phase == Phase::Running || self.shared.exiting() {
            debug!(engine = %self.shared.engine_id, "Start ignored: engine busy or exiting");
            return false;
        }
        self.shared.interrupt.store(false, Ordering::Release);
        control.phase = Phase::Running;
        control.start_epoch += 1;
        let epoch = control.start_epoch;
        self.shared.running.store(true, Ordering::Release);
        self.shared.wake.notify_all();
        info!(engine = %self.shared.engine_id, epoch, queued = control.chains.len(), "Engine started");

        if block {
            while control.ack_epoch < epoch && !self.shared.exiting() {
                control = wait(&self.shared.ack, control);
            }
        }
        true
    }

    /// Requests the current run to end at the next task boundary.
    ///
    /// Queued chains and pending tasks are discarded. With `block`, returns
    /// once the worker is idle. Always returns `true`.
    pub fn stop(&self, block: bool) -> bool {
        self.shared.request_stop();
        info!(engine = %self.shared.engine_id, "Engine stop requested");
        if block {
            let mut control = lock(&self.shared.control);
            while control.phase == Phase::Running && !self.shared.exiting() {
                control = wait(&self.shared.ack, control);
            }
        }
        true
    }

    /// Whether a run is in progress.
    pub fn running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Queues a chain rooted at `entry`.
    ///
    /// Chains queued while running are picked up by the current run.
    pub fn append_chain(&self, entry: &str) -> Result<ChainId> {
        if self.shared.exiting() {
            return Err(EngineError::Exited);
        }
        if !self.store.contains(entry) {
            return Err(EngineError::UnknownEntry(entry.to_string()));
        }
        let mut control = lock(&self.shared.control);
        let id = ChainId(control.next_chain);
        control.next_chain += 1;
        control.chains.push_back(ChainRequest { id, entry: entry.to_string() });
        debug!(chain = %id, entry, "Chain queued");
        Ok(id)
    }

    /// Read-only view of the current or last run.
    pub fn snapshot(&self) -> RunSnapshot {
        let mut snapshot = self.shared.read_snapshot();
        snapshot.running = self.running();
        snapshot.queued_chains = lock(&self.shared.control).chains.len();
        snapshot
    }

    /// Sends `request` to the call handler.
    ///
    /// The result is published as an `AsyncCallInfo` notification and can
    /// be read with [`Engine::wait_call`]. With `block`, returns only once
    /// the call has finished.
    pub fn async_call(&self, request: CallRequest, block: bool) -> CallId {
        let id = CallId(self.next_call.fetch_add(1, Ordering::Relaxed));
        let sent = self.call_tx.as_ref().is_some_and(|tx| tx.send((id, request.clone())).is_ok());
        if !sent {
            error!(call = %id, "Call handler is gone");
            let outcome = CallOutcome::failed(id, &request, json!({ "why": "EngineExited" }));
            lock(&self.shared.calls).record(outcome);
            self.shared.call_done.notify_all();
        } else if block
            && let Err(e) = self.wait_call(id)
        {
            debug!(call = %id, error = %e, "Blocking call ended without an outcome");
        }
        id
    }

    /// Waits for the outcome of call `id`.
    ///
    /// Only the last [`RETAINED_CALLS`](crate::RETAINED_CALLS)
    /// outcomes are kept; reading one does not remove it.
    ///
    /// # Errors
    /// [`EngineError::UnknownCall`] for ids this engine never issued,
    /// [`EngineError::CallExpired`] once the outcome has been evicted, and
    /// [`EngineError::Exited`] if the engine shuts down first.
    pub fn wait_call(&self, id: CallId) -> Result<CallOutcome> {
        if id.0 == 0 || id.0 >= self.next_call.load(Ordering::Relaxed) {
            return Err(EngineError::UnknownCall(id));
        }
        let mut calls = lock(&self.shared.calls);
        loop {
            if let Some(outcome) = calls.get(id) {
                return Ok(outcome.clone());
            }
            if calls.expired(id) {
                return Err(EngineError::CallExpired(id));
            }
            if self.shared.exiting() {
                return Err(EngineError::Exited);
            }
            calls = wait(&self.shared.call_done, calls);
        }
    }

    /// Stops the engine and joins its threads.
    pub fn destroy(self) {
        info!(engine = %self.shared.engine_id, "Destroying engine");
        drop(self);
    }

    fn shutdown(&mut self) {
        self.shared.exit.store(true, Ordering::Release);
        self.shared.interrupt.store(true, Ordering::Release);
        {
            let _control = lock(&self.shared.control);
            self.shared.wake.notify_all();
            self.shared.ack.notify_all();
        }
        {
            let _calls = lock(&self.shared.calls);
            self.shared.call_done.notify_all();
        }

        join(self.worker.take(), "worker");
        drop(self.call_tx.take());
        join(self.call_thread.take(), "call");
        join(self.msg_thread.take(), "message");

        self.shared.running.store(false, Ordering::Release);
        debug!(engine = %self.shared.engine_id, "Engine threads joined");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn(name: &str, role: &'static str, body: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| EngineError::Spawn { role, source })
}

fn join(handle: Option<JoinHandle<()>>, role: &str) {
    if let Some(handle) = handle
        && handle.join().is_err()
    {
        error!(role, "Engine thread panicked");
    }
}
