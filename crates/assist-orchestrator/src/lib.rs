//! Assist Orchestrator: the task-chain execution engine.
//!
//! An [`Engine`] walks chains of perception-then-action tasks from a
//! [`TaskStore`](assist_core::TaskStore): recognize a task on the device
//! screen, run its action, run its subs, then continue with the first `next`
//! candidate that is recognized. Progress is reported through a
//! [`NotificationSink`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use assist_core::{EngineConfig, TaskStore};
//! use assist_orchestrator::{Engine, FnSink, NotificationEvent};
//!
//! # fn demo(
//! #     controller: Arc<dyn assist_abstraction::Controller>,
//! #     recognizer: Arc<dyn assist_abstraction::Recognizer>,
//! # ) -> assist_orchestrator::Result<()> {
//! let store = Arc::new(TaskStore::load_from_file("tasks.json".as_ref())?);
//! let sink = Arc::new(FnSink(|event: &NotificationEvent| println!("{}", event.to_json())));
//! let engine = Engine::new(store, controller, recognizer, sink, EngineConfig::default())?;
//!
//! engine.append_chain("StartUp")?;
//! engine.start(false);
//! // ...
//! engine.stop(true);
//! # Ok(())
//! # }
//! ```

mod action;
pub mod calls;
mod cycle;
pub mod error;
pub mod lifecycle;
pub mod notification;
pub mod run_state;
mod traversal;

pub use calls::{CallId, CallOutcome, CallRequest, RETAINED_CALLS};
pub use error::{EngineError, Result};
pub use lifecycle::Engine;
pub use notification::{FnSink, MessageKind, NotificationEvent, NotificationSink};
pub use run_state::{ChainId, RunSnapshot};
