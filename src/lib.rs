//! Rust ViT Toolkit
//!
//! Two independent building blocks of a vision-transformer training setup:
//! a patch embedding layer and configurable learning-rate schedules.
//!
//! # Modules
//!
//! - `layers`: Layer trait, strided Conv2D and the ViT patch embedding
//! - `optimizers`: Optimizer trait and SGD; the handle schedules adjust
//! - `schedule`: Base schedules, warmup, and the config-driven factory
//! - `config`: Schedule and patch embedding configuration, JSON loading
//! - `error`: `ConfigError` and `ShapeError`

pub mod config;
pub mod error;
pub mod layers;
pub mod optimizers;
pub mod schedule;

pub use config::{PatchEmbedConfig, ScheduleConfig, SizeSpec};
pub use error::{ConfigError, ShapeError};
pub use layers::{Layer, PatchEmbedder};
pub use schedule::{build_schedule, LRScheduler, Schedule, ScheduleFactory};
