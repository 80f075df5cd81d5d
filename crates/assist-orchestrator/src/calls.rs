//! Async calls: device operations requested from outside the execution cycle.

use crate::lifecycle::{Shared, lock};
use crate::notification::{MessageKind, Notifier};
use assist_abstraction::{Controller, Point};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Identifies an async call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operations accepted by [`Engine::async_call`](crate::Engine::async_call).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallRequest {
    /// Connect to the device.
    Connect,
    /// Tap a point.
    Click(Point),
    /// Capture the screen.
    Screencap,
    /// Read the run snapshot.
    Snapshot,
    /// Ask the running cycle to stop, without waiting.
    Stop,
}

impl CallRequest {
    /// Name reported in `AsyncCallInfo`.
    pub fn what(&self) -> &'static str {
        match self {
            Self::Connect => "Connect",
            Self::Click(_) => "Click",
            Self::Screencap => "Screencap",
            Self::Snapshot => "Snapshot",
            Self::Stop => "Stop",
        }
    }
}

/// Result of a finished async call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    /// Call id.
    pub id: CallId,
    /// Operation name.
    pub what: &'static str,
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Time spent executing.
    pub cost: Duration,
    /// Operation-specific payload.
    pub details: Value,
}

impl CallOutcome {
    pub(crate) fn failed(id: CallId, request: &CallRequest, details: Value) -> Self {
        Self { id, what: request.what(), ok: false, cost: Duration::ZERO, details }
    }
}

/// Finished outcomes kept for [`Engine::wait_call`](crate::Engine::wait_call).
pub const RETAINED_CALLS: usize = 256;

/// Most recent call outcomes, oldest evicted first.
#[derive(Debug, Default)]
pub(crate) struct CallLog {
    outcomes: HashMap<CallId, CallOutcome>,
    order: VecDeque<CallId>,
    /// Highest id evicted so far.
    evicted_through: u64,
}

impl CallLog {
    pub(crate) fn record(&mut self, outcome: CallOutcome) {
        let id = outcome.id;
        if self.outcomes.insert(id, outcome).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > RETAINED_CALLS {
            if let Some(oldest) = self.order.pop_front() {
                self.outcomes.remove(&oldest);
                self.evicted_through = self.evicted_through.max(oldest.0);
            }
        }
    }

    pub(crate) fn get(&self, id: CallId) -> Option<&CallOutcome> {
        self.outcomes.get(&id)
    }

    /// Whether `id` finished but its outcome has since been evicted.
    pub(crate) fn expired(&self, id: CallId) -> bool {
        id.0 <= self.evicted_through && !self.outcomes.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.outcomes.len()
    }
}

/// Executes calls one at a time on the call thread.
pub(crate) struct CallHandler {
    shared: Arc<Shared>,
    controller: Arc<dyn Controller>,
    notifier: Notifier,
}

impl CallHandler {
    pub(crate) fn new(shared: Arc<Shared>, controller: Arc<dyn Controller>, notifier: Notifier) -> Self {
        Self { shared, controller, notifier }
    }

    /// Serves requests until the sender side is dropped.
    pub(crate) fn run(self, mut rx: UnboundedReceiver<(CallId, CallRequest)>) {
        while let Some((id, request)) = rx.blocking_recv() {
            let outcome = self.execute(id, &request);
            self.notifier.global(
                MessageKind::AsyncCallInfo,
                json!({
                    "async_call_id": id,
                    "what": outcome.what,
                    "ret": outcome.ok,
                    "cost_ms": outcome.cost.as_millis() as u64,
                    "details": outcome.details,
                }),
            );
            lock(&self.shared.calls).record(outcome);
            self.shared.call_done.notify_all();
        }
        debug!("Call handler finished");
    }

    fn execute(&self, id: CallId, request: &CallRequest) -> CallOutcome {
        let started = Instant::now();
        debug!(call = %id, what = request.what(), "Executing async call");
        let (ok, details) = match request {
            CallRequest::Connect => self.connect(),
            CallRequest::Click(point) => match self.controller.click(*point) {
                Ok(()) => (true, json!({ "point": [point.x, point.y] })),
                Err(e) => (false, json!({ "why": e.to_string() })),
            },
            CallRequest::Screencap => match self.controller.screencap() {
                Ok(frame) => (true, json!({ "width": frame.width, "height": frame.height })),
                Err(e) => (false, json!({ "why": e.to_string() })),
            },
            CallRequest::Snapshot => match serde_json::to_value(self.shared.read_snapshot()) {
                Ok(snapshot) => (true, snapshot),
                Err(e) => (false, json!({ "why": e.to_string() })),
            },
            CallRequest::Stop => {
                self.shared.request_stop();
                (true, Value::Null)
            }
        };
        if !ok {
            warn!(call = %id, what = request.what(), details = %details, "Async call failed");
        }
        CallOutcome { id, what: request.what(), ok, cost: started.elapsed(), details }
    }

    fn connect(&self) -> (bool, Value) {
        match self.controller.connect() {
            Ok(()) => {
                info!("Device connected");
                self.notifier.global(MessageKind::ConnectionInfo, json!({ "what": "Connected" }));
                (true, Value::Null)
            }
            Err(e) => {
                warn!(error = %e, "Device connection failed");
                let details = json!({ "what": "ConnectFailed", "why": e.to_string() });
                self.notifier.global(MessageKind::ConnectionInfo, details.clone());
                (false, details)
            }
        }
    }
}
