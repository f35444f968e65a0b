//! Kernel configuration.
//!
//! Every section has a `Default` and is `#[serde(default)]`, so a config file
//! only needs to name the values it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or validating a [`KernelConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fixed-step clock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Seconds of simulation time per tick.
    pub fixed_delta: f32,
    /// Upper bound on ticks advanced by a single update.
    pub max_steps_per_update: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            fixed_delta: 1.0 / 60.0,
            max_steps_per_update: 4,
        }
    }
}

/// Bounds applied to the resolved time scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeScaleConfig {
    pub min_scale: f32,
    pub max_scale: f32,
}

impl Default for TimeScaleConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 10.0,
        }
    }
}

/// History recording settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// How far back history is retained, in seconds of simulation time.
    pub horizon_seconds: f32,
    /// Target samples per second for the most important objects.
    pub samples_per_second: f32,
    /// Maximum number of samples written per tick across all tracked objects.
    pub record_budget: usize,
    /// Ceiling on the number of objects a single history store may track.
    pub max_tracked_objects: usize,
    /// Capacity of each generic tick-indexed snapshot store.
    pub snapshot_capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            horizon_seconds: 30.0,
            samples_per_second: 60.0,
            record_budget: 512,
            max_tracked_objects: 4096,
            snapshot_capacity: 2048,
        }
    }
}

/// Rewind workflow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    /// Live ticks re-simulated per update while in catch-up mode.
    pub catch_up_ticks_per_update: u32,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            catch_up_ticks_per_update: 4,
        }
    }
}

/// Complete kernel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub clock: ClockConfig,
    pub time_scale: TimeScaleConfig,
    pub history: HistoryConfig,
    pub rewind: RewindConfig,
    /// When set, recording, playback and commit are skipped unconditionally.
    pub multiplayer_session: bool,
}

impl KernelConfig {
    /// Load a config from a `.yaml`/`.yml` or `.json` file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let config: KernelConfig = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&text)?,
            "json" => serde_json::from_str(&text)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded kernel config");
        Ok(config)
    }

    /// Render the config as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_positive(self.clock.fixed_delta) {
            return Err(ConfigError::Invalid(format!(
                "clock.fixed_delta must be positive, got {}",
                self.clock.fixed_delta
            )));
        }
        if self.clock.max_steps_per_update == 0 {
            return Err(ConfigError::Invalid(
                "clock.max_steps_per_update must be at least 1".into(),
            ));
        }
        let ts = &self.time_scale;
        if ts.min_scale < 0.0 || ts.min_scale > ts.max_scale {
            return Err(ConfigError::Invalid(format!(
                "time_scale bounds are inverted or negative: [{}, {}]",
                ts.min_scale, ts.max_scale
            )));
        }
        let h = &self.history;
        if !is_positive(h.horizon_seconds) || !is_positive(h.samples_per_second) {
            return Err(ConfigError::Invalid(
                "history.horizon_seconds and history.samples_per_second must be positive".into(),
            ));
        }
        if h.record_budget == 0 || h.max_tracked_objects == 0 || h.snapshot_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history budget and capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Ticks per second of simulation time.
    pub fn ticks_per_second(&self) -> f32 {
        1.0 / self.clock.fixed_delta
    }

    /// History horizon in ticks, at least one.
    pub fn horizon_ticks(&self) -> u64 {
        ((self.history.horizon_seconds * self.ticks_per_second()).round() as u64).max(1)
    }

    /// Ticks between samples for a `Hero` importance object.
    pub fn base_sample_interval(&self) -> u64 {
        ((self.ticks_per_second() / self.history.samples_per_second).round() as u64).max(1)
    }
}

fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}
