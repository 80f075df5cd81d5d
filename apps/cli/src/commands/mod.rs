//! Command implementations for the Assist CLI.

pub mod graph;
pub mod run;
pub mod validate;

use anyhow::Context;
use assist_core::TaskStore;
use std::path::PathBuf;

/// Load every definition file into one validated store.
pub fn load_store(files: &[PathBuf]) -> anyhow::Result<TaskStore> {
    let listed = files.iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join(", ");
    TaskStore::load_files(files).with_context(|| format!("Failed to load task definitions from {listed}"))
}
