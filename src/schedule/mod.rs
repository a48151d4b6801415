//! Learning rate schedules
//!
//! A [`Schedule`] turns a training step into a multiplicative factor on the
//! optimizer's initial learning rate. It is a base schedule ([`BaseSchedule`])
//! optionally wrapped in a [`Warmup`] phase, and is normally built from a
//! declarative [`ScheduleConfig`](crate::config::ScheduleConfig) by the
//! [`ScheduleFactory`].
//!
//! # Example
//!
//! ```ignore
//! let mut optimizer = SGD::new(0.1);
//! let mut schedule = build_schedule(&optimizer, Some(&config), &mut LogSink)?;
//!
//! for _ in 0..num_steps {
//!     optimizer.set_learning_rate(schedule.get_lr());
//!     // ... forward, backward, update ...
//!     schedule.step();
//! }
//! ```

mod factory;
mod kinds;
mod sink;
mod warmup;

pub use factory::{build_schedule, ScheduleFactory, NAME_KEY};
pub use kinds::{BaseSchedule, Constructor};
pub use sink::{EventSink, LogSink, RecordingSink, ScheduleEvent};
pub use warmup::{Warmup, WarmupMode, DEFAULT_WARMUP_FACTOR, DEFAULT_WARMUP_ITERS, WARMUP_KEYS};

use crate::optimizers::Optimizer;

/// Core trait for stateful learning rate schedulers.
///
/// Schedulers track the current step and report the learning rate to use
/// for it.
pub trait LRScheduler {
    /// Get the learning rate for the current step.
    fn get_lr(&self) -> f32;

    /// Advance the scheduler to the next step.
    fn step(&mut self);

    /// Reset the scheduler to its initial state.
    fn reset(&mut self);
}

/// A base schedule plus optional warmup, anchored at the optimizer's initial
/// learning rate.
///
/// `factor(step)` is a pure function of the step; the step counter behind
/// [`LRScheduler`] is only a convenience for training loops.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    base: BaseSchedule,
    warmup: Option<Warmup>,
    base_lr: f32,
    current_step: usize,
}

impl Schedule {
    pub fn new(base: BaseSchedule, warmup: Option<Warmup>, base_lr: f32) -> Self {
        Self {
            base,
            warmup,
            base_lr,
            current_step: 0,
        }
    }

    pub fn base(&self) -> &BaseSchedule {
        &self.base
    }

    pub fn warmup(&self) -> Option<&Warmup> {
        self.warmup.as_ref()
    }

    /// Learning rate the factors are relative to.
    pub fn base_lr(&self) -> f32 {
        self.base_lr
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Multiplicative learning-rate factor at `step`.
    pub fn factor(&self, step: usize) -> f64 {
        let base = self.base.factor(step);
        match &self.warmup {
            Some(warmup) => warmup.apply(step, base),
            None => base,
        }
    }

    /// Absolute learning rate at `step`.
    pub fn lr_at(&self, step: usize) -> f32 {
        (self.base_lr as f64 * self.factor(step)) as f32
    }

    /// Set the optimizer's learning rate for `step`.
    pub fn apply(&self, step: usize, optimizer: &mut dyn Optimizer) {
        optimizer.set_learning_rate(self.lr_at(step));
    }
}

impl LRScheduler for Schedule {
    fn get_lr(&self) -> f32 {
        self.lr_at(self.current_step)
    }

    fn step(&mut self) {
        self.current_step += 1;
    }

    fn reset(&mut self) {
        self.current_step = 0;
    }
}
