//! Schedule construction from declarative configuration

use crate::config::ScheduleConfig;
use crate::error::ConfigError;
use crate::optimizers::Optimizer;
use crate::schedule::kinds::{self, BaseSchedule, Constructor};
use crate::schedule::sink::{EventSink, ScheduleEvent};
use crate::schedule::warmup::{Warmup, WARMUP_KEYS};
use crate::schedule::Schedule;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Key selecting the base schedule.
pub const NAME_KEY: &str = "name";

/// Maps schedule names to their constructors and builds [`Schedule`]s.
///
/// Registered names: `constant_lr` (`constant`), `poly_lr` (`polynomial`),
/// `multi_step`, `cosine_annealing` and `exp_lr` (`exponential`).
///
/// # Example
///
/// ```
/// use rust_vit_toolkit::config::ScheduleConfig;
/// use rust_vit_toolkit::optimizers::SGD;
/// use rust_vit_toolkit::schedule::{RecordingSink, ScheduleFactory};
///
/// let config = ScheduleConfig::from_json_str(
///     r#"{"name": "multi_step", "milestones": [8000], "gamma": 0.1}"#,
/// ).unwrap();
/// let schedule = ScheduleFactory::new()
///     .build(&SGD::new(0.1), Some(&config), &mut RecordingSink::new())
///     .unwrap();
/// assert_eq!(schedule.factor(7999), 1.0);
/// ```
#[derive(Clone)]
pub struct ScheduleFactory {
    registry: BTreeMap<&'static str, Constructor>,
}

impl fmt::Debug for ScheduleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleFactory")
            .field("registry", &self.names())
            .finish()
    }
}

impl Default for ScheduleFactory {
    fn default() -> Self {
        let entries: [(&'static str, Constructor); 8] = [
            ("constant_lr", kinds::constant),
            ("constant", kinds::constant),
            ("poly_lr", kinds::polynomial),
            ("polynomial", kinds::polynomial),
            ("multi_step", kinds::multi_step),
            ("cosine_annealing", kinds::cosine_annealing),
            ("exp_lr", kinds::exponential),
            ("exponential", kinds::exponential),
        ];
        Self {
            registry: entries.into_iter().collect(),
        }
    }
}

impl ScheduleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered schedule names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.registry.keys().copied().collect()
    }

    /// Build a schedule for `optimizer` from `config`.
    ///
    /// The optimizer's current learning rate becomes the schedule's base
    /// learning rate. A missing or empty config yields a constant schedule
    /// and never fails. `config` is only read.
    ///
    /// # Errors
    ///
    /// * [`ConfigError::MissingName`] / [`ConfigError::InvalidName`] if `name`
    ///   is absent or not a string
    /// * [`ConfigError::UnknownSchedule`] if `name` is not registered
    /// * [`ConfigError::InvalidWarmup`] for bad warmup settings
    /// * [`ConfigError::InvalidParameters`] if the remaining keys do not match
    ///   the selected schedule
    pub fn build(
        &self,
        optimizer: &dyn Optimizer,
        config: Option<&ScheduleConfig>,
        sink: &mut dyn EventSink,
    ) -> Result<Schedule, ConfigError> {
        let base_lr = optimizer.learning_rate();

        let Some(config) = config.filter(|config| !config.is_empty()) else {
            sink.record(ScheduleEvent::FallbackToConstant);
            return Ok(Schedule::new(BaseSchedule::Constant, None, base_lr));
        };

        let name = match config.get(NAME_KEY) {
            Some(Value::String(name)) => name.as_str(),
            Some(other) => return Err(ConfigError::InvalidName(other.to_string())),
            None => return Err(ConfigError::MissingName),
        };
        let constructor = self
            .registry
            .get(name)
            .ok_or_else(|| ConfigError::UnknownSchedule {
                name: name.to_string(),
                registered: self.names(),
            })?;

        let warmup = Warmup::from_config(config)?;

        let mut excluded = vec![NAME_KEY];
        excluded.extend(WARMUP_KEYS);
        let params = config.without(&excluded);

        let base = constructor(name, params.clone(), base_lr)?;
        sink.record(ScheduleEvent::BaseSchedule {
            name: name.to_string(),
            params: Value::Object(params),
        });
        if let Some(warmup) = &warmup {
            sink.record(ScheduleEvent::Warmup {
                iters: warmup.iters(),
                mode: warmup.mode(),
                factor: warmup.factor(),
            });
        }

        Ok(Schedule::new(base, warmup, base_lr))
    }
}

/// Build with a default [`ScheduleFactory`].
pub fn build_schedule(
    optimizer: &dyn Optimizer,
    config: Option<&ScheduleConfig>,
    sink: &mut dyn EventSink,
) -> Result<Schedule, ConfigError> {
    ScheduleFactory::new().build(optimizer, config, sink)
}
