//! 2D Convolutional layer implementation
//!
//! This module provides a Conv2DLayer with rectangular kernels, independent
//! vertical/horizontal stride and zero-padding. The forward pass lowers the
//! convolution to a single matrix multiplication (im2col), which is also how the
//! backward pass recovers weight, bias and input gradients.

use crate::error::ShapeError;
use crate::layers::Layer;
use crate::optimizers::Optimizer;
use ndarray::{Array, Array1, Array2, Array4, Axis, Dimension};
use rand::Rng;
use rand_distr::StandardNormal;
use std::cell::RefCell;

/// Stride and padding for a [`Conv2DLayer`].
///
/// Pairs are `(vertical, horizontal)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2DOptions {
    pub stride: (usize, usize),
    pub padding: (usize, usize),
}

/// 2D Convolutional layer with learnable filters.
///
/// Slides `out_channels` filters of size `in_channels × kh × kw` over a batch of
/// images shaped `(batch, in_channels, height, width)` and produces feature maps
/// shaped `(batch, out_channels, out_height, out_width)`.
///
/// # Fields
///
/// * `kernel_size` - `(kh, kw)`
/// * `stride` - `(sh, sw)`, both positive
/// * `padding` - `(ph, pw)` zero-padding applied symmetrically
/// * `weights` - filters flattened to `(out_channels, in_channels * kh * kw)`,
///   each row laid out channel-major, then kernel row, then kernel column
/// * `biases` - one bias per output channel
///
/// # Example
///
/// ```ignore
/// use rand::{rngs::StdRng, SeedableRng};
/// use rust_vit_toolkit::layers::{Conv2DLayer, Conv2DOptions};
///
/// let mut rng = StdRng::seed_from_u64(42);
/// let options = Conv2DOptions { stride: (1, 1), padding: (1, 1) };
/// let layer = Conv2DLayer::new(1, 8, (3, 3), options, &mut rng)?;
/// assert_eq!(layer.out_channels(), 8);
/// ```
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    weights: Array2<f32>,
    biases: Array1<f32>,
    // Gradient accumulators (mutable interior via RefCell for trait compatibility)
    grad_weights: RefCell<Array2<f32>>,
    grad_biases: RefCell<Array1<f32>>,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer.
    ///
    /// Weights are drawn from N(0, 1); biases start at zero.
    ///
    /// # Errors
    ///
    /// Returns [`ShapeError::ZeroDimension`] if a channel count, kernel
    /// dimension or stride is zero.
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        options: Conv2DOptions,
        rng: &mut R,
    ) -> Result<Self, ShapeError> {
        let checks = [
            (in_channels, "in_channels"),
            (out_channels, "out_channels"),
            (kernel_size.0, "kernel height"),
            (kernel_size.1, "kernel width"),
            (options.stride.0, "vertical stride"),
            (options.stride.1, "horizontal stride"),
        ];
        if let Some(&(_, name)) = checks.iter().find(|(value, _)| *value == 0) {
            return Err(ShapeError::ZeroDimension(name));
        }

        let patch_len = in_channels * kernel_size.0 * kernel_size.1;
        let weights = Array2::<f32>::from_shape_fn((out_channels, patch_len), |_| {
            rng.sample(StandardNormal)
        });

        Ok(Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: options.stride,
            padding: options.padding,
            weights,
            biases: Array1::zeros(out_channels),
            grad_weights: RefCell::new(Array2::zeros((out_channels, patch_len))),
            grad_biases: RefCell::new(Array1::zeros(out_channels)),
        })
    }

    /// Get the number of input channels.
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Get the number of output channels (filters).
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        self.kernel_size
    }

    pub fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub fn padding(&self) -> (usize, usize) {
        self.padding
    }

    /// Filters as `(out_channels, in_channels * kh * kw)`.
    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    pub fn biases(&self) -> &Array1<f32> {
        &self.biases
    }

    /// Accumulated weight gradients since the last parameter update.
    pub fn grad_weights(&self) -> Array2<f32> {
        self.grad_weights.borrow().clone()
    }

    pub fn grad_biases(&self) -> Array1<f32> {
        self.grad_biases.borrow().clone()
    }

    /// Overwrite the filters and biases, e.g. to load known values.
    pub fn set_parameters(
        &mut self,
        weights: Array2<f32>,
        biases: Array1<f32>,
    ) -> Result<(), ShapeError> {
        if weights.dim() != self.weights.dim() {
            return Err(ShapeError::ParameterShape {
                name: "weights",
                expected: self.weights.shape().to_vec(),
                actual: weights.shape().to_vec(),
            });
        }
        if biases.len() != self.out_channels {
            return Err(ShapeError::ParameterShape {
                name: "biases",
                expected: vec![self.out_channels],
                actual: biases.shape().to_vec(),
            });
        }
        self.weights = weights;
        self.biases = biases;
        Ok(())
    }

    /// Spatial output size for an input of `height × width`.
    ///
    /// Calculated per dimension as `(input + 2 * padding - kernel) / stride + 1`.
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize), ShapeError> {
        let padded = (height + 2 * self.padding.0, width + 2 * self.padding.1);
        if padded.0 < self.kernel_size.0 || padded.1 < self.kernel_size.1 {
            return Err(ShapeError::InputShape {
                input: (height, width),
                kernel: self.kernel_size,
                padding: self.padding,
            });
        }
        Ok((
            (padded.0 - self.kernel_size.0) / self.stride.0 + 1,
            (padded.1 - self.kernel_size.1) / self.stride.1 + 1,
        ))
    }

    fn check_input(&self, input: &Array4<f32>) -> Result<(usize, usize), ShapeError> {
        let (_, channels, height, width) = input.dim();
        if channels != self.in_channels {
            return Err(ShapeError::ChannelCount {
                expected: self.in_channels,
                actual: channels,
            });
        }
        self.output_size(height, width)
    }

    /// Unfold every receptive field into one row: `(batch * oh * ow, in_channels * kh * kw)`.
    fn im2col(&self, input: &Array4<f32>, out_size: (usize, usize)) -> Array2<f32> {
        let (batch, channels, height, width) = input.dim();
        let (oh, ow) = out_size;
        let (kh, kw) = self.kernel_size;
        let mut cols = Array2::<f32>::zeros((batch * oh * ow, channels * kh * kw));

        for n in 0..batch {
            for oy in 0..oh {
                for ox in 0..ow {
                    let row = (n * oh + oy) * ow + ox;
                    for c in 0..channels {
                        for ky in 0..kh {
                            let Some(iy) = self.source_row(oy, ky, height) else {
                                continue;
                            };
                            for kx in 0..kw {
                                if let Some(ix) = self.source_col(ox, kx, width) {
                                    cols[[row, (c * kh + ky) * kw + kx]] = input[[n, c, iy, ix]];
                                }
                            }
                        }
                    }
                }
            }
        }
        cols
    }

    /// Inverse of `im2col`: scatter-add column gradients back onto the input grid.
    fn col2im(
        &self,
        cols: &Array2<f32>,
        input_dim: (usize, usize, usize, usize),
        out_size: (usize, usize),
    ) -> Array4<f32> {
        let (batch, channels, height, width) = input_dim;
        let (oh, ow) = out_size;
        let (kh, kw) = self.kernel_size;
        let mut grad_input = Array4::<f32>::zeros(input_dim);

        for n in 0..batch {
            for oy in 0..oh {
                for ox in 0..ow {
                    let row = (n * oh + oy) * ow + ox;
                    for c in 0..channels {
                        for ky in 0..kh {
                            let Some(iy) = self.source_row(oy, ky, height) else {
                                continue;
                            };
                            for kx in 0..kw {
                                if let Some(ix) = self.source_col(ox, kx, width) {
                                    let col = (c * kh + ky) * kw + kx;
                                    grad_input[[n, c, iy, ix]] += cols[[row, col]];
                                }
                            }
                        }
                    }
                }
            }
        }
        grad_input
    }

    /// Input row read by output row `out` and kernel row `k`, or `None` when
    /// it falls in the zero-padding.
    fn source_row(&self, out: usize, k: usize, height: usize) -> Option<usize> {
        (out * self.stride.0 + k)
            .checked_sub(self.padding.0)
            .filter(|&index| index < height)
    }

    fn source_col(&self, out: usize, k: usize, width: usize) -> Option<usize> {
        (out * self.stride.1 + k)
            .checked_sub(self.padding.1)
            .filter(|&index| index < width)
    }
}

impl Layer for Conv2DLayer {
    type Input = Array4<f32>;
    type Output = Array4<f32>;

    fn forward(&self, input: &Array4<f32>) -> Result<Array4<f32>, ShapeError> {
        let (oh, ow) = self.check_input(input)?;
        let batch = input.dim().0;

        let cols = self.im2col(input, (oh, ow));
        // [batch * oh * ow, patch_len] x [patch_len, out_channels]
        let mut projected = cols.dot(&self.weights.t());
        projected += &self.biases;

        Ok(Array4::from_shape_fn(
            (batch, self.out_channels, oh, ow),
            |(n, o, y, x)| projected[[(n * oh + y) * ow + x, o]],
        ))
    }

    fn backward(
        &self,
        input: &Array4<f32>,
        grad_output: &Array4<f32>,
    ) -> Result<Array4<f32>, ShapeError> {
        let (oh, ow) = self.check_input(input)?;
        let batch = input.dim().0;
        let expected = (batch, self.out_channels, oh, ow);
        if grad_output.dim() != expected {
            return Err(ShapeError::GradientShape {
                expected: vec![expected.0, expected.1, expected.2, expected.3],
                actual: grad_output.shape().to_vec(),
            });
        }

        let grad_rows = Array2::from_shape_fn((batch * oh * ow, self.out_channels), |(row, o)| {
            let n = row / (oh * ow);
            let rem = row % (oh * ow);
            grad_output[[n, o, rem / ow, rem % ow]]
        });

        let cols = self.im2col(input, (oh, ow));
        *self.grad_weights.borrow_mut() += &grad_rows.t().dot(&cols);
        *self.grad_biases.borrow_mut() += &grad_rows.sum_axis(Axis(0));

        let grad_cols = grad_rows.dot(&self.weights);
        Ok(self.col2im(&grad_cols, input.dim(), (oh, ow)))
    }

    fn update_parameters(&mut self, optimizer: &mut dyn Optimizer) {
        let mut grad_weights = self.grad_weights.borrow_mut();
        let mut grad_biases = self.grad_biases.borrow_mut();
        step_parameters(optimizer, &mut self.weights, &*grad_weights);
        step_parameters(optimizer, &mut self.biases, &*grad_biases);
        grad_weights.fill(0.0);
        grad_biases.fill(0.0);
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}

/// Hand a parameter tensor and its gradient to the optimizer as flat slices.
pub(crate) fn step_parameters<D: Dimension>(
    optimizer: &mut dyn Optimizer,
    parameters: &mut Array<f32, D>,
    gradients: &Array<f32, D>,
) {
    if let (Some(params), Some(grads)) = (parameters.as_slice_mut(), gradients.as_slice()) {
        optimizer.update(params, grads);
        return;
    }
    let mut flat: Vec<f32> = parameters.iter().copied().collect();
    let grads: Vec<f32> = gradients.iter().copied().collect();
    optimizer.update(&mut flat, &grads);
    parameters
        .iter_mut()
        .zip(flat)
        .for_each(|(param, value)| *param = value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(
        in_c: usize,
        out_c: usize,
        kernel: (usize, usize),
        options: Conv2DOptions,
    ) -> Conv2DLayer {
        let mut rng = StdRng::seed_from_u64(42);
        Conv2DLayer::new(in_c, out_c, kernel, options, &mut rng).unwrap()
    }

    fn opts(stride: (usize, usize), padding: (usize, usize)) -> Conv2DOptions {
        Conv2DOptions { stride, padding }
    }

    fn ramp(dim: (usize, usize, usize, usize)) -> Array4<f32> {
        Array4::from_shape_fn(dim, |(n, c, y, x)| {
            ((n * 7 + c * 5 + y * 3 + x) % 11) as f32 * 0.1 - 0.5
        })
    }

    #[test]
    fn test_conv2d_initialization() {
        let layer = layer(1, 8, (3, 3), opts((1, 1), (1, 1)));

        assert_eq!(layer.in_channels(), 1);
        assert_eq!(layer.out_channels(), 8);
        assert_eq!(layer.kernel_size(), (3, 3));
        assert_eq!(layer.padding(), (1, 1));
        assert_eq!(layer.stride(), (1, 1));
    }

    #[test]
    fn test_conv2d_parameter_count() {
        let layer = layer(1, 8, (3, 3), opts((1, 1), (0, 0)));

        // weights: 8 * 1 * 3 * 3 = 72, biases: 8
        assert_eq!(layer.parameter_count(), 80);
    }

    #[test]
    fn test_conv2d_output_dimensions() {
        let padded = layer(1, 8, (3, 3), opts((1, 1), (1, 1)));
        assert_eq!(padded.output_size(28, 28).unwrap(), (28, 28));

        let valid = layer(1, 8, (3, 3), opts((1, 1), (0, 0)));
        assert_eq!(valid.output_size(28, 28).unwrap(), (26, 26));

        let strided = layer(3, 4, (16, 8), opts((16, 8), (0, 0)));
        assert_eq!(strided.output_size(224, 64).unwrap(), (14, 8));
    }

    #[test]
    fn test_conv2d_rejects_zero_stride() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = Conv2DLayer::new(
            3,
            4,
            (2, 2),
            opts((0, 1), (0, 0)),
            &mut rng,
        );
        assert_eq!(result.err(), Some(ShapeError::ZeroDimension("vertical stride")));
    }

    #[test]
    fn test_conv2d_input_too_small() {
        let layer = layer(1, 1, (5, 5), opts((1, 1), (0, 0)));
        assert!(matches!(layer.output_size(3, 8), Err(ShapeError::InputShape { .. })));
    }

    #[test]
    fn test_conv2d_standard_normal_initialization() {
        let layer = layer(3, 16, (5, 5), opts((1, 1), (0, 0)));
        let count = layer.weights().len() as f32;
        let mean = layer.weights().sum() / count;
        let variance = layer.weights().mapv(|w| (w - mean) * (w - mean)).sum() / count;

        // 1200 draws from N(0, 1)
        assert!(mean.abs() < 0.15, "mean {mean}");
        assert!((0.8..1.2).contains(&variance), "variance {variance}");
        assert!(layer.biases().iter().all(|b| *b == 0.0));
    }

    #[test]
    fn test_conv2d_deterministic_initialization() {
        let layer1 = layer(3, 16, (5, 5), opts((1, 1), (0, 0)));
        let layer2 = layer(3, 16, (5, 5), opts((1, 1), (0, 0)));

        assert_eq!(layer1.weights(), layer2.weights());
        assert_eq!(layer1.biases(), layer2.biases());
    }

    #[test]
    fn test_conv2d_set_parameters_checks_each_shape() {
        let mut conv = layer(2, 3, (2, 2), opts((1, 1), (0, 0)));

        let wrong_weights = conv.set_parameters(Array2::zeros((3, 4)), Array1::zeros(3));
        assert_eq!(
            wrong_weights.err(),
            Some(ShapeError::ParameterShape {
                name: "weights",
                expected: vec![3, 8],
                actual: vec![3, 4],
            })
        );

        let wrong_biases = conv.set_parameters(Array2::zeros((3, 8)), Array1::zeros(2));
        assert_eq!(
            wrong_biases.err(),
            Some(ShapeError::ParameterShape {
                name: "biases",
                expected: vec![3],
                actual: vec![2],
            })
        );

        assert!(conv.set_parameters(Array2::ones((3, 8)), Array1::ones(3)).is_ok());
        assert!(conv.weights().iter().all(|w| *w == 1.0));
    }

    #[test]
    fn test_conv2d_forward_matches_direct_convolution() {
        let options = opts((1, 2), (1, 0));
        let mut conv = layer(2, 3, (2, 3), options);
        conv.set_parameters(conv.weights().clone(), Array1::from(vec![0.1, -0.2, 0.3]))
            .unwrap();
        let input = ramp((2, 2, 4, 7));

        let output = conv.forward(&input).unwrap();
        let (oh, ow) = conv.output_size(4, 7).unwrap();
        assert_eq!(output.dim(), (2, 3, oh, ow));

        for n in 0..2 {
            for o in 0..3 {
                for y in 0..oh {
                    for x in 0..ow {
                        let mut expected = conv.biases()[o];
                        for c in 0..2 {
                            for ky in 0..2 {
                                for kx in 0..3 {
                                    let iy = (y + ky) as isize - 1;
                                    let ix = (x * 2 + kx) as isize;
                                    if iy < 0 || iy >= 4 || ix >= 7 {
                                        continue;
                                    }
                                    expected += conv.weights()[[o, (c * 2 + ky) * 3 + kx]]
                                        * input[[n, c, iy as usize, ix as usize]];
                                }
                            }
                        }
                        assert!((output[[n, o, y, x]] - expected).abs() < 1e-5);
                    }
                }
            }
        }
    }

    #[test]
    fn test_conv2d_forward_rejects_wrong_channels() {
        let conv = layer(3, 4, (2, 2), opts((1, 1), (0, 0)));
        let input = Array4::<f32>::zeros((1, 1, 4, 4));
        assert_eq!(
            conv.forward(&input).err(),
            Some(ShapeError::ChannelCount { expected: 3, actual: 1 })
        );
    }

    #[test]
    fn test_conv2d_backward_matches_finite_differences() {
        let options = opts((2, 1), (1, 1));
        let conv = layer(2, 2, (3, 2), options);
        let input = ramp((1, 2, 5, 4));
        let output = conv.forward(&input).unwrap();
        // L = sum(output * upstream)
        let upstream = Array4::from_shape_fn(output.dim(), |(_, o, y, x)| {
            0.3 * o as f32 - 0.1 * y as f32 + 0.05 * x as f32 + 0.2
        });
        let loss = |layer: &Conv2DLayer, input: &Array4<f32>| -> f32 {
            (layer.forward(input).unwrap() * &upstream).sum()
        };

        let grad_input = conv.backward(&input, &upstream).unwrap();
        let eps = 1e-2f32;

        for &(c, y, x) in &[(0, 0, 0), (1, 2, 3), (0, 4, 1), (1, 3, 0)] {
            let mut plus = input.clone();
            plus[[0, c, y, x]] += eps;
            let mut minus = input.clone();
            minus[[0, c, y, x]] -= eps;
            let numeric = (loss(&conv, &plus) - loss(&conv, &minus)) / (2.0 * eps);
            assert!(
                (numeric - grad_input[[0, c, y, x]]).abs() < 1e-2,
                "input grad mismatch at {:?}: {} vs {}",
                (c, y, x),
                numeric,
                grad_input[[0, c, y, x]]
            );
        }

        let grad_weights = conv.grad_weights();
        for &(o, k) in &[(0, 0), (1, 5), (0, 11), (1, 7)] {
            let mut shifted = layer(2, 2, (3, 2), options);
            let mut plus = conv.weights().clone();
            plus[[o, k]] += eps;
            shifted.set_parameters(plus, conv.biases().clone()).unwrap();
            let up = loss(&shifted, &input);
            let mut minus = conv.weights().clone();
            minus[[o, k]] -= eps;
            shifted.set_parameters(minus, conv.biases().clone()).unwrap();
            let down = loss(&shifted, &input);
            let numeric = (up - down) / (2.0 * eps);
            assert!((numeric - grad_weights[[o, k]]).abs() < 1e-2);
        }

        let expected_bias = upstream
            .sum_axis(Axis(3))
            .sum_axis(Axis(2))
            .sum_axis(Axis(0));
        for o in 0..2 {
            assert!((conv.grad_biases()[o] - expected_bias[o]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_conv2d_update_parameters_applies_and_clears_gradients() {
        let mut conv = layer(1, 1, (2, 2), opts((2, 2), (0, 0)));
        let input = Array4::from_elem((1, 1, 2, 2), 1.0f32);
        let before = conv.weights().clone();

        conv.backward(&input, &Array4::from_elem((1, 1, 1, 1), 1.0)).unwrap();
        let mut sgd = SGD::new(0.5);
        conv.update_parameters(&mut sgd);

        // grad_w = 1 for every tap, grad_b = 1
        for (after, before) in conv.weights().iter().zip(before.iter()) {
            assert!((after - (before - 0.5)).abs() < 1e-6);
        }
        assert!((conv.biases()[0] + 0.5).abs() < 1e-6);
        assert!(conv.grad_weights().iter().all(|g| *g == 0.0));
        assert!(conv.grad_biases().iter().all(|g| *g == 0.0));
    }
}
