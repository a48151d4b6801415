//! Base learning-rate schedules
//!
//! Each variant maps a step to a multiplicative factor on the optimizer's
//! initial learning rate. Parameters are read from the schedule configuration
//! through one strict `Deserialize` struct per kind, so misspelled or foreign
//! keys are rejected instead of ignored.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::f64::consts::PI;

/// A base schedule, selected by the `name` key of the configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum BaseSchedule {
    /// Factor is always 1.
    Constant,
    /// `(1 - min(step, max_iters) / max_iters) ^ power`
    Polynomial { max_iters: usize, power: f64 },
    /// `gamma ^ (number of milestones <= step)`
    MultiStep { milestones: Vec<usize>, gamma: f64 },
    /// `min_factor + (1 - min_factor) * (1 + cos(pi * step / t_max)) / 2`
    ///
    /// `min_factor` is `eta_min / base_lr`. Past `t_max` the curve keeps its
    /// period and climbs back towards 1.
    CosineAnnealing { t_max: usize, min_factor: f64 },
    /// `gamma ^ step`
    Exponential { gamma: f64 },
}

impl BaseSchedule {
    /// Multiplicative factor at `step`.
    pub fn factor(&self, step: usize) -> f64 {
        match self {
            BaseSchedule::Constant => 1.0,
            BaseSchedule::Polynomial { max_iters, power } => {
                let progress = step.min(*max_iters) as f64 / *max_iters as f64;
                (1.0 - progress).powf(*power)
            }
            BaseSchedule::MultiStep { milestones, gamma } => {
                let passed = milestones.iter().filter(|&&milestone| milestone <= step).count();
                gamma.powi(passed as i32)
            }
            BaseSchedule::CosineAnnealing { t_max, min_factor } => {
                let cosine = (1.0 + (PI * step as f64 / *t_max as f64).cos()) / 2.0;
                min_factor + (1.0 - min_factor) * cosine
            }
            BaseSchedule::Exponential { gamma } => gamma.powf(step as f64),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConstantParams {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolynomialParams {
    #[serde(alias = "max_steps")]
    max_iters: usize,
    #[serde(default = "default_power")]
    power: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MultiStepParams {
    milestones: Vec<usize>,
    #[serde(default = "default_gamma")]
    gamma: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CosineAnnealingParams {
    #[serde(rename = "T_max", alias = "t_max")]
    t_max: usize,
    #[serde(default)]
    eta_min: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExponentialParams {
    gamma: f64,
}

fn default_power() -> f64 {
    0.9
}

fn default_gamma() -> f64 {
    0.1
}

fn parse<T: DeserializeOwned>(name: &str, params: Map<String, Value>) -> Result<T, ConfigError> {
    serde_json::from_value(Value::Object(params)).map_err(|err| invalid(name, err.to_string()))
}

fn invalid(name: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameters {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn non_negative(name: &str, key: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(name, format!("{key} must be a non-negative number, got {value}")))
    }
}

/// Signature shared by every registered constructor: the registered name (for
/// error messages), the parameters left after removing `name` and the warmup
/// keys, and the optimizer's initial learning rate.
pub type Constructor = fn(&str, Map<String, Value>, f32) -> Result<BaseSchedule, ConfigError>;

pub(crate) fn constant(
    name: &str,
    params: Map<String, Value>,
    _base_lr: f32,
) -> Result<BaseSchedule, ConfigError> {
    let ConstantParams {} = parse(name, params)?;
    Ok(BaseSchedule::Constant)
}

pub(crate) fn polynomial(
    name: &str,
    params: Map<String, Value>,
    _base_lr: f32,
) -> Result<BaseSchedule, ConfigError> {
    let params: PolynomialParams = parse(name, params)?;
    if params.max_iters == 0 {
        return Err(invalid(name, "max_iters must be positive"));
    }
    Ok(BaseSchedule::Polynomial {
        max_iters: params.max_iters,
        power: non_negative(name, "power", params.power)?,
    })
}

pub(crate) fn multi_step(
    name: &str,
    params: Map<String, Value>,
    _base_lr: f32,
) -> Result<BaseSchedule, ConfigError> {
    let params: MultiStepParams = parse(name, params)?;
    let mut milestones = params.milestones;
    milestones.sort_unstable();
    Ok(BaseSchedule::MultiStep {
        milestones,
        gamma: non_negative(name, "gamma", params.gamma)?,
    })
}

pub(crate) fn cosine_annealing(
    name: &str,
    params: Map<String, Value>,
    base_lr: f32,
) -> Result<BaseSchedule, ConfigError> {
    let params: CosineAnnealingParams = parse(name, params)?;
    if params.t_max == 0 {
        return Err(invalid(name, "T_max must be positive"));
    }
    let eta_min = non_negative(name, "eta_min", params.eta_min)?;
    let min_factor = if base_lr > 0.0 {
        eta_min / base_lr as f64
    } else {
        0.0
    };
    Ok(BaseSchedule::CosineAnnealing {
        t_max: params.t_max,
        min_factor,
    })
}

pub(crate) fn exponential(
    name: &str,
    params: Map<String, Value>,
    _base_lr: f32,
) -> Result<BaseSchedule, ConfigError> {
    let params: ExponentialParams = parse(name, params)?;
    Ok(BaseSchedule::Exponential {
        gamma: non_negative(name, "gamma", params.gamma)?,
    })
}
