//! Optimizer abstractions for neural network parameter updates
//!
//! This module provides the Optimizer trait and a vanilla SGD implementation.
//! The optimizer is also the handle a [`Schedule`](crate::schedule::Schedule)
//! adjusts: schedules only ever touch it through `learning_rate` and
//! `set_learning_rate`.
//!
//! # Example
//!
//! ```ignore
//! use rust_vit_toolkit::optimizers::{Optimizer, SGD};
//!
//! let mut optimizer = SGD::new(0.01);
//! optimizer.update(&mut weights, &gradients);
//! ```

pub mod sgd;

pub use sgd::SGD;

/// Core trait for neural network optimizers.
///
/// Optimizers work with flat f32 slices; layers hand over each parameter
/// tensor together with its accumulated gradient.
pub trait Optimizer {
    /// Update parameters using gradients.
    ///
    /// # Panics
    ///
    /// Implementations may panic if parameters and gradients have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    /// Get the current learning rate.
    fn learning_rate(&self) -> f32;

    /// Set the learning rate, typically from a learning-rate schedule.
    fn set_learning_rate(&mut self, lr: f32);
}
