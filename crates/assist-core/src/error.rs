//! Error types for Assist Core.

use thiserror::Error;

/// Core error type for task definitions and configuration.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A task name that is not defined in the store.
    #[error("Unknown task: '{0}'")]
    UnknownTask(String),

    /// A task refers to a name that is not defined.
    #[error("Task '{task}' references unknown task '{reference}' in '{field}'")]
    DanglingReference {
        /// Task holding the reference.
        task: String,
        /// Field the reference appears in.
        field: &'static str,
        /// The unresolved name.
        reference: String,
    },

    /// The same name was defined twice.
    #[error("Task '{0}' is defined more than once")]
    DuplicateTask(String),

    /// A definition could not be turned into a descriptor.
    #[error("Invalid task '{task}': {reason}")]
    InvalidTask {
        /// Task name.
        task: String,
        /// Why the definition was rejected.
        reason: String,
    },

    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML errors.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl CoreError {
    pub(crate) fn invalid(task: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTask { task: task.to_string(), reason: reason.into() }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
