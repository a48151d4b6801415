//! Layer trait definition for neural network layers
//!
//! This module defines the core Layer trait shared by the convolution and the
//! patch embedding. The trait provides a common interface for forward
//! propagation, backward propagation and parameter updates.

use crate::error::ShapeError;
use crate::optimizers::Optimizer;

/// Core trait for neural network layers.
///
/// Layers consume and produce `ndarray` tensors whose rank depends on the
/// layer, so the input and output types are associated types.
///
/// # Example
///
/// ```ignore
/// // Forward pass through a layer
/// let output = layer.forward(&input)?;
///
/// // Backward pass to accumulate parameter gradients
/// let grad_input = layer.backward(&input, &grad_output)?;
///
/// // Apply the accumulated gradients
/// layer.update_parameters(&mut optimizer);
/// ```
pub trait Layer {
    /// Tensor type accepted by `forward`.
    type Input;

    /// Tensor type produced by `forward`.
    type Output;

    /// Forward propagation through the layer.
    ///
    /// # Errors
    ///
    /// Returns a [`ShapeError`] if `input` does not have the shape the layer
    /// was configured for.
    fn forward(&self, input: &Self::Input) -> Result<Self::Output, ShapeError>;

    /// Backward propagation through the layer.
    ///
    /// Accumulates gradients for weights and biases internally and returns
    /// the gradient of the loss with respect to `input`.
    ///
    /// # Arguments
    ///
    /// * `input` - Input data from the forward pass
    /// * `grad_output` - Gradient of loss w.r.t. layer output
    ///
    /// # Notes
    ///
    /// - The input should be the same data used in the corresponding forward pass
    /// - Gradients keep accumulating until `update_parameters` is called
    fn backward(
        &self,
        input: &Self::Input,
        grad_output: &Self::Output,
    ) -> Result<Self::Input, ShapeError>;

    /// Update layer parameters using accumulated gradients.
    ///
    /// The optimizer decides the update rule and the learning rate; the
    /// accumulated gradients are cleared afterwards.
    fn update_parameters(&mut self, optimizer: &mut dyn Optimizer);

    /// Get the number of trainable parameters in the layer.
    fn parameter_count(&self) -> usize;
}
