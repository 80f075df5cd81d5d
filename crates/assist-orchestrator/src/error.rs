// Error types for the engine

use crate::calls::CallId;
use assist_abstraction::{ControlError, RecognitionError};
use assist_core::CoreError;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// A chain was requested for a task the store does not define
    #[error("Unknown chain entry: '{0}'")]
    UnknownEntry(String),

    /// Task store or configuration error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A background thread could not be started
    #[error("Failed to spawn {role} thread: {source}")]
    Spawn {
        /// Thread role
        role: &'static str,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// The engine is shutting down
    #[error("Engine has exited")]
    Exited,

    /// No call with this id was ever issued
    #[error("Unknown async call: {0}")]
    UnknownCall(CallId),

    /// The call finished but its outcome is no longer retained
    #[error("Outcome of async call {0} is no longer retained")]
    CallExpired(CallId),
}

/// Faults raised while a task touches the device or the recognizer.
#[derive(Debug, Error)]
pub(crate) enum StepError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}
