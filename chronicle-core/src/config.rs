//! Configuration for the timeline subsystem
//!
//! Configuration is layered: compiled-in defaults, then an optional TOML
//! file, then `CHRONICLE_`-prefixed environment variables. All fields have
//! working defaults, so a zero-config embedding is valid.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ChronicleError, Result};

/// Default configuration file name, resolved relative to the working
/// directory unless `CHRONICLE_CONFIG_PATH` points elsewhere
pub const DEFAULT_CONFIG_FILE: &str = "chronicle.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChronicleConfig {
    /// Fixed session id for the recording store; generated when absent
    pub session_id: Option<String>,

    /// Replay scheduling parameters
    pub replay: ReplayTimingConfig,

    /// Export policy
    pub export: ExportConfig,
}

/// Timing parameters for scheduled replay
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayTimingConfig {
    /// Lower clamp on the inter-event delay during auto-play
    #[serde(with = "humantime_serde")]
    pub min_step_delay: Duration,

    /// Upper clamp on the inter-event delay during auto-play
    #[serde(with = "humantime_serde")]
    pub max_step_delay: Duration,

    /// Speed multiplier used when a session does not specify one
    pub default_speed: f64,
}

impl Default for ReplayTimingConfig {
    fn default() -> Self {
        Self {
            min_step_delay: Duration::from_millis(10),
            max_step_delay: Duration::from_secs(5),
            default_speed: 1.0,
        }
    }
}

/// Export policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Include events flagged as containing PII in exported documents
    pub include_pii: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { include_pii: true }
    }
}

impl ChronicleConfig {
    /// Load configuration from the default file location and environment.
    ///
    /// Layering, lowest to highest precedence: built-in defaults, the TOML
    /// file (if present), then `CHRONICLE_*` environment variables (nested
    /// keys separated by `__`, e.g. `CHRONICLE_REPLAY__DEFAULT_SPEED`).
    pub fn load() -> Result<Self> {
        let path = std::env::var("CHRONICLE_CONFIG_PATH")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(path)
    }

    /// Load configuration with an explicit file path
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CHRONICLE_").split("__"))
            .extract()
            .map_err(|e| ChronicleError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !self.replay.default_speed.is_finite() || self.replay.default_speed <= 0.0 {
            return Err(ChronicleError::Configuration(format!(
                "replay.default_speed must be positive, got {}",
                self.replay.default_speed
            )));
        }
        if self.replay.min_step_delay > self.replay.max_step_delay {
            return Err(ChronicleError::Configuration(
                "replay.min_step_delay must not exceed replay.max_step_delay".to_string(),
            ));
        }
        Ok(())
    }
}
