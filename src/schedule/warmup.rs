//! Warmup phase wrapped around a base schedule

use crate::config::ScheduleConfig;
use crate::error::ConfigError;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Configuration keys that enable and parameterise warmup.
pub const WARMUP_KEYS: [&str; 3] = ["warmup_iters", "warmup_mode", "warmup_factor"];

pub const DEFAULT_WARMUP_ITERS: usize = 100;
pub const DEFAULT_WARMUP_FACTOR: f64 = 0.2;

/// How the factor evolves during warmup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarmupMode {
    /// Ramp linearly from `factor` at step 0 towards 1 at `iters`.
    #[default]
    Linear,
    /// Hold `factor` until `iters`.
    Constant,
}

impl fmt::Display for WarmupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarmupMode::Linear => write!(f, "linear"),
            WarmupMode::Constant => write!(f, "constant"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WarmupParams {
    #[serde(default = "default_iters")]
    warmup_iters: usize,
    #[serde(default)]
    warmup_mode: WarmupMode,
    #[serde(default = "default_factor")]
    warmup_factor: f64,
}

fn default_iters() -> usize {
    DEFAULT_WARMUP_ITERS
}

fn default_factor() -> f64 {
    DEFAULT_WARMUP_FACTOR
}

/// Warmup decorator.
///
/// For `step < iters` the base factor is scaled down; from `iters` on the
/// base schedule is used unchanged. Steps are not offset: the base schedule
/// sees the same step counter during and after warmup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Warmup {
    iters: usize,
    mode: WarmupMode,
    factor: f64,
}

impl Warmup {
    /// # Errors
    ///
    /// [`ConfigError::InvalidWarmup`] unless `iters >= 1` and `factor` is in `(0, 1]`.
    pub fn new(iters: usize, mode: WarmupMode, factor: f64) -> Result<Self, ConfigError> {
        if iters == 0 {
            return Err(ConfigError::InvalidWarmup(
                "warmup_iters must be positive".to_string(),
            ));
        }
        if !(factor > 0.0 && factor <= 1.0) {
            return Err(ConfigError::InvalidWarmup(format!(
                "warmup_factor must be in (0, 1], got {factor}"
            )));
        }
        Ok(Self { iters, mode, factor })
    }

    /// Extract the warmup settings from a schedule configuration.
    ///
    /// Returns `Ok(None)` when none of [`WARMUP_KEYS`] is present. Keys that
    /// are present but partial fall back to 100 iterations, linear mode and
    /// factor 0.2.
    pub fn from_config(config: &ScheduleConfig) -> Result<Option<Self>, ConfigError> {
        let keys = config.only(&WARMUP_KEYS);
        if keys.is_empty() {
            return Ok(None);
        }
        let params: WarmupParams = serde_json::from_value(Value::Object(keys))
            .map_err(|err| ConfigError::InvalidWarmup(err.to_string()))?;
        Self::new(params.warmup_iters, params.warmup_mode, params.warmup_factor).map(Some)
    }

    pub fn iters(&self) -> usize {
        self.iters
    }

    pub fn mode(&self) -> WarmupMode {
        self.mode
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Scale applied on top of the base factor at `step`.
    pub fn multiplier(&self, step: usize) -> f64 {
        if step >= self.iters {
            return 1.0;
        }
        match self.mode {
            WarmupMode::Linear => {
                let alpha = step as f64 / self.iters as f64;
                self.factor * (1.0 - alpha) + alpha
            }
            WarmupMode::Constant => self.factor,
        }
    }

    /// Combined factor given the base schedule's factor at the same step.
    pub fn apply(&self, step: usize, base_factor: f64) -> f64 {
        self.multiplier(step) * base_factor
    }
}
