//! Engine configuration discovery.

use anyhow::Context;
use assist_core::EngineConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "ASSIST_CONFIG";

/// Load the engine configuration.
///
/// Precedence:
/// 1. `--config` argument
/// 2. `ASSIST_CONFIG` environment variable
/// 3. Defaults
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let path = explicit.map(Path::to_path_buf).or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading engine configuration");
            EngineConfig::load_from_file(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}
