//! Engine configuration.
//!
//! Loaded from TOML; every field has a default, so an empty file is valid:
//!
//! ```toml
//! retry_delay_ms = 500
//! swipe_duration_ms = 200
//! checkpoint_interval_ms = 10
//! window_width = 1280
//! window_height = 720
//! ```

use crate::error::{CoreError, Result};
use assist_abstraction::Rect;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Timing and geometry knobs for the execution cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pause between recognition attempts of the same task.
    pub retry_delay_ms: u64,
    /// Duration of a swipe gesture.
    pub swipe_duration_ms: u64,
    /// Granularity at which delays check for stop and exit requests.
    pub checkpoint_interval_ms: u64,
    /// Screen width used by `ClickRand`.
    pub window_width: i32,
    /// Screen height used by `ClickRand`.
    pub window_height: i32,
    /// Seed for click-point selection; random when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 500,
            swipe_duration_ms: 200,
            checkpoint_interval_ms: 10,
            window_width: 1280,
            window_height: 720,
            rng_seed: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CoreError::Config(format!("file not found: {}", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Rejects values the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval_ms == 0 {
            return Err(CoreError::Config("checkpoint_interval_ms must be positive".to_string()));
        }
        if self.window_width <= 0 || self.window_height <= 0 {
            return Err(CoreError::Config(format!(
                "window size {}x{} is not positive",
                self.window_width, self.window_height
            )));
        }
        Ok(())
    }

    /// Pause between recognition attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Swipe gesture duration.
    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration_ms)
    }

    /// Delay slice between stop checks.
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_millis(self.checkpoint_interval_ms)
    }

    /// The full screen, for `ClickRand`.
    pub fn window(&self) -> Rect {
        Rect::new(0, 0, self.window_width, self.window_height)
    }
}
