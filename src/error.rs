//! Error types for schedule construction and patch embedding
//!
//! Every failure in this crate is a configuration or programmer error, so
//! nothing is retried: errors propagate to the caller as soon as they are seen.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or interpreting a schedule configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("schedule config is missing the `name` key")]
    MissingName,

    #[error("schedule `name` must be a string, got {0}")]
    InvalidName(String),

    #[error("unknown schedule `{name}`, expected one of: {}", registered.join(", "))]
    UnknownSchedule {
        name: String,
        registered: Vec<&'static str>,
    },

    #[error("invalid parameters for `{name}` schedule: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("schedule config must be a JSON object, got {0}")]
    NotAMapping(String),

    #[error("schedule config has both a top-level `name` and an `lr_schedule` section")]
    AmbiguousSection,

    #[error("invalid warmup: {0}")]
    InvalidWarmup(String),

    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised when tensor shapes disagree with a layer's configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("{0} must be positive")]
    ZeroDimension(&'static str),

    #[error("image size {image:?} is not divisible by patch size {patch:?}")]
    NotDivisible {
        image: (usize, usize),
        patch: (usize, usize),
    },

    #[error("input image size {actual:?} doesn't match model ({expected:?})")]
    ImageSize {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("expected {expected} input channels, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    #[error("gradient shape {actual:?} doesn't match output shape {expected:?}")]
    GradientShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{name} shape {actual:?} doesn't match layer shape {expected:?}")]
    ParameterShape {
        name: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error(
        "input of size {input:?} is too small for kernel {kernel:?} with padding {padding:?}"
    )]
    InputShape {
        input: (usize, usize),
        kernel: (usize, usize),
        padding: (usize, usize),
    },
}
