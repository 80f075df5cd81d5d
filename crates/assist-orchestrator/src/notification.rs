//! Notification channel.
//!
//! Every observable step of the engine becomes a [`NotificationEvent`]. The
//! worker and the call handler push events into one unbounded channel; a
//! dedicated consumer thread drains it in order and hands each event to the
//! user's [`NotificationSink`].

use crate::run_state::ChainId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, trace};
use uuid::Uuid;

/// Kind of a notification, with a stable numeric code.
///
/// Codes are grouped: global events below 10000, chain events from 10000,
/// sub-task events from 20000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// The engine hit an unexpected fault; it stays usable.
    InternalError = 0,
    /// A run could not begin.
    InitFailed = 1,
    /// Device connection status changed.
    ConnectionInfo = 2,
    /// Every queued chain has been processed.
    AllTasksCompleted = 3,
    /// An async call finished.
    AsyncCallInfo = 4,

    /// A chain failed.
    ChainError = 10000,
    /// A chain started.
    ChainStart = 10001,
    /// A chain ran out of successors.
    ChainCompleted = 10002,
    /// Extra information about a chain.
    ChainExtraInfo = 10003,
    /// A chain was interrupted by a stop request.
    ChainStopped = 10004,

    /// A task failed.
    SubTaskError = 20000,
    /// A task started.
    SubTaskStart = 20001,
    /// A task finished.
    SubTaskCompleted = 20002,
    /// Extra information about a task.
    SubTaskExtraInfo = 20003,
    /// A task was interrupted by a stop request.
    SubTaskStopped = 20004,
}

impl MessageKind {
    /// Numeric code of this kind.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InternalError => "InternalError",
            Self::InitFailed => "InitFailed",
            Self::ConnectionInfo => "ConnectionInfo",
            Self::AllTasksCompleted => "AllTasksCompleted",
            Self::AsyncCallInfo => "AsyncCallInfo",
            Self::ChainError => "ChainError",
            Self::ChainStart => "ChainStart",
            Self::ChainCompleted => "ChainCompleted",
            Self::ChainExtraInfo => "ChainExtraInfo",
            Self::ChainStopped => "ChainStopped",
            Self::SubTaskError => "SubTaskError",
            Self::SubTaskStart => "SubTaskStart",
            Self::SubTaskCompleted => "SubTaskCompleted",
            Self::SubTaskExtraInfo => "SubTaskExtraInfo",
            Self::SubTaskStopped => "SubTaskStopped",
        }
    }

    /// Whether this is a task-level event.
    pub fn is_subtask(self) -> bool {
        self.code() >= 20000
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One notification delivered to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// What happened.
    pub kind: MessageKind,
    /// Chain the event belongs to, if any.
    pub chain: Option<ChainId>,
    /// Task the event belongs to, if any.
    pub task: Option<String>,
    /// Kind-specific payload.
    pub details: Value,
    /// Engine that produced the event.
    pub engine_id: Uuid,
}

impl NotificationEvent {
    /// Renders the event as a flat JSON object.
    ///
    /// `details` fields are merged into the top level next to `code`, `msg`,
    /// `uuid`, `chain` and `task`.
    pub fn to_json(&self) -> Value {
        let mut object = match &self.details {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("details".to_string(), other.clone());
                map
            }
        };
        object.insert("code".to_string(), json!(self.kind.code()));
        object.insert("msg".to_string(), json!(self.kind.as_str()));
        object.insert("uuid".to_string(), json!(self.engine_id.to_string()));
        if let Some(chain) = self.chain {
            object.insert("chain".to_string(), json!(chain));
        }
        if let Some(task) = &self.task {
            object.insert("task".to_string(), json!(task));
        }
        Value::Object(object)
    }
}

/// Receiver of engine notifications.
///
/// Called from the engine's message thread, one event at a time, in the
/// order the events were produced.
pub trait NotificationSink: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &NotificationEvent);
}

/// Adapts a closure into a [`NotificationSink`].
pub struct FnSink<F>(pub F);

impl<F> NotificationSink for FnSink<F>
where
    F: Fn(&NotificationEvent) + Send + Sync,
{
    fn on_event(&self, event: &NotificationEvent) {
        (self.0)(event);
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

/// Producer handle stamped with the engine id.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    engine_id: Uuid,
    tx: UnboundedSender<NotificationEvent>,
}

impl Notifier {
    pub(crate) fn new(engine_id: Uuid, tx: UnboundedSender<NotificationEvent>) -> Self {
        Self { engine_id, tx }
    }

    /// Emits an engine-wide event.
    pub(crate) fn global(&self, kind: MessageKind, details: Value) {
        self.emit(kind, None, None, details);
    }

    /// Emits a chain event.
    pub(crate) fn chain(&self, kind: MessageKind, chain: ChainId, details: Value) {
        self.emit(kind, Some(chain), None, details);
    }

    /// Emits a task event.
    pub(crate) fn subtask(&self, kind: MessageKind, chain: ChainId, task: &str, details: Value) {
        self.emit(kind, Some(chain), Some(task.to_string()), details);
    }

    fn emit(&self, kind: MessageKind, chain: Option<ChainId>, task: Option<String>, details: Value) {
        trace!(kind = %kind, chain = ?chain, task = ?task, "Queueing notification");
        let event = NotificationEvent { kind, chain, task, details, engine_id: self.engine_id };
        if self.tx.send(event).is_err() {
            debug!(kind = %kind, "Notification dropped: consumer has stopped");
        }
    }
}

/// Drains the channel into `sink` until every producer is gone.
pub(crate) fn consume(mut rx: UnboundedReceiver<NotificationEvent>, sink: &dyn NotificationSink) {
    let mut delivered = 0u64;
    while let Some(event) = rx.blocking_recv() {
        if catch_unwind(AssertUnwindSafe(|| sink.on_event(&event))).is_err() {
            error!(kind = %event.kind, "Notification sink panicked");
        }
        delivered += 1;
    }
    debug!(delivered, "Notification consumer finished");
}
