//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! Vanilla update: `parameter = parameter - learning_rate * gradient`

use crate::optimizers::Optimizer;

/// Stochastic Gradient Descent optimizer.
///
/// `w = w - η * ∇L/∂w`
///
/// # Example
///
/// ```
/// use rust_vit_toolkit::optimizers::{Optimizer, SGD};
///
/// let mut optimizer = SGD::new(0.1);
/// let mut params = vec![1.0, 2.0, 3.0];
/// let grads = vec![0.1, 0.2, 0.3];
///
/// optimizer.update(&mut params, &grads);
/// assert!((params[0] - 0.99).abs() < 1e-6);
/// assert!((params[2] - 2.97).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct SGD {
    learning_rate: f32,
}

impl SGD {
    /// Creates a new SGD optimizer with the specified learning rate.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for SGD {
    /// # Panics
    ///
    /// Panics if `parameters` and `gradients` have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * grad;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.learning_rate = lr;
    }
}
