//! Assist Core: task definitions and engine configuration.
//!
//! Provides the immutable [`TaskStore`] the engine traverses and the
//! [`EngineConfig`] that tunes its timing.

pub mod config;
pub mod error;
pub mod task;

pub use config::EngineConfig;
pub use error::{CoreError, Result};
pub use task::{Action, TaskDescriptor, TaskStore};
