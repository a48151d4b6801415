//! Configuration structures
//!
//! This module provides the declarative inputs of the crate: the schedule
//! configuration mapping consumed by [`ScheduleFactory`](crate::schedule::ScheduleFactory)
//! and the construction parameters of [`PatchEmbedder`](crate::layers::PatchEmbedder).
//! Both can be loaded from JSON files.

use crate::error::ConfigError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Key that may wrap a schedule configuration inside a larger training config.
pub const LR_SCHEDULE_KEY: &str = "lr_schedule";

/// Declarative learning-rate schedule configuration.
///
/// A JSON object with a required `name` key selecting the base schedule, the
/// kind-specific parameters, and the optional `warmup_iters`, `warmup_mode`
/// and `warmup_factor` keys. The mapping is never mutated by the factory.
///
/// # Example
///
/// ```json
/// {
///   "name": "multi_step",
///   "milestones": [8000],
///   "gamma": 0.1,
///   "warmup_iters": 500,
///   "warmup_mode": "linear",
///   "warmup_factor": 0.2
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleConfig(Map<String, Value>);

impl ScheduleConfig {
    /// An empty configuration; the factory treats it like a missing one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, mostly useful in code and tests.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// Parse a configuration from a JSON string.
    ///
    /// A top-level `lr_schedule` object is unwrapped, so a whole training
    /// config section can be passed as-is. A `name` next to that section is
    /// rejected rather than dropped.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        Self::try_from(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Copy of the mapping minus `keys`.
    pub fn without(&self, keys: &[&str]) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(key, _)| !keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Copy of the mapping restricted to `keys`.
    pub fn only(&self, keys: &[&str]) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(key, _)| keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl From<Map<String, Value>> for ScheduleConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for ScheduleConfig {
    type Error = ConfigError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map)
                if map.contains_key(LR_SCHEDULE_KEY) && map.contains_key("name") =>
            {
                Err(ConfigError::AmbiguousSection)
            }
            Value::Object(mut map) => match map.remove(LR_SCHEDULE_KEY) {
                Some(Value::Object(inner)) => Ok(Self(inner)),
                Some(Value::Null) => Ok(Self::default()),
                Some(other) => Err(ConfigError::NotAMapping(other.to_string())),
                None => Ok(Self(map)),
            },
            Value::Null => Ok(Self::default()),
            other => Err(ConfigError::NotAMapping(other.to_string())),
        }
    }
}

/// Loads a schedule configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use rust_vit_toolkit::config::load_schedule_config;
///
/// let cfg = load_schedule_config("config/multi_step_warmup.json").unwrap();
/// assert!(cfg.contains_key("name"));
/// ```
pub fn load_schedule_config(path: impl AsRef<Path>) -> Result<ScheduleConfig, ConfigError> {
    let contents = read(path.as_ref())?;
    ScheduleConfig::from_json_str(&contents)
}

/// A spatial size given either as one integer (square) or as `[height, width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Square(usize),
    Rect(usize, usize),
}

impl SizeSpec {
    /// `(height, width)`
    pub fn to_pair(self) -> (usize, usize) {
        match self {
            SizeSpec::Square(side) => (side, side),
            SizeSpec::Rect(height, width) => (height, width),
        }
    }
}

impl From<usize> for SizeSpec {
    fn from(side: usize) -> Self {
        SizeSpec::Square(side)
    }
}

impl From<(usize, usize)> for SizeSpec {
    fn from((height, width): (usize, usize)) -> Self {
        SizeSpec::Rect(height, width)
    }
}

/// Construction parameters of a [`PatchEmbedder`](crate::layers::PatchEmbedder).
///
/// Missing fields take the ViT-Base defaults: 224px images, 16px patches,
/// 3 channels and 768-dimensional embeddings.
///
/// ```json
/// { "image_size": 224, "patch_size": [16, 16], "channel_count": 3, "embed_dim": 768 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchEmbedConfig {
    pub image_size: SizeSpec,
    pub patch_size: SizeSpec,
    pub channel_count: usize,
    pub embed_dim: usize,
}

impl Default for PatchEmbedConfig {
    fn default() -> Self {
        Self {
            image_size: SizeSpec::Square(224),
            patch_size: SizeSpec::Square(16),
            channel_count: 3,
            embed_dim: 768,
        }
    }
}

impl PatchEmbedConfig {
    pub fn new(
        image_size: impl Into<SizeSpec>,
        patch_size: impl Into<SizeSpec>,
        channel_count: usize,
        embed_dim: usize,
    ) -> Self {
        Self {
            image_size: image_size.into(),
            patch_size: patch_size.into(),
            channel_count,
            embed_dim,
        }
    }
}

/// Loads patch embedding parameters from a JSON file.
pub fn load_patch_embed_config(path: impl AsRef<Path>) -> Result<PatchEmbedConfig, ConfigError> {
    let contents = read(path.as_ref())?;
    Ok(serde_json::from_str(&contents)?)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
