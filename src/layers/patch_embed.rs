//! ViT patch embedding
//!
//! Splits images into a grid of non-overlapping patches and projects every
//! patch to an embedding vector. The projection is a convolution whose kernel
//! and stride both equal the patch size, so each output position sees exactly
//! one patch.

use crate::config::PatchEmbedConfig;
use crate::error::ShapeError;
use crate::layers::{Conv2DLayer, Conv2DOptions, Layer};
use crate::optimizers::Optimizer;
use ndarray::{Array3, Array4};
use rand::Rng;

/// 2D image to patch embedding.
///
/// Maps a batch shaped `(batch, channels, height, width)` to a sequence shaped
/// `(patch_count, batch, embed_dim)`. Sequence position `i` holds the patch at
/// grid cell `(i / grid_w, i % grid_w)`, i.e. the grid is walked row by row.
///
/// # Example
///
/// ```ignore
/// use rand::{rngs::StdRng, SeedableRng};
/// use rust_vit_toolkit::config::PatchEmbedConfig;
/// use rust_vit_toolkit::layers::{Layer, PatchEmbedder};
///
/// let mut rng = StdRng::seed_from_u64(0);
/// let embed = PatchEmbedder::new(&PatchEmbedConfig::new(32, 8, 3, 64), &mut rng)?;
/// let tokens = embed.forward(&images)?; // (16, batch, 64)
/// ```
pub struct PatchEmbedder {
    image_size: (usize, usize),
    patch_size: (usize, usize),
    grid_size: (usize, usize),
    proj: Conv2DLayer,
}

impl PatchEmbedder {
    /// Build the embedder, drawing projection weights from N(0, 1) with zero bias.
    ///
    /// # Errors
    ///
    /// * [`ShapeError::ZeroDimension`] if any size or count is zero
    /// * [`ShapeError::NotDivisible`] if the patch size does not evenly divide
    ///   the image size; remainder pixels are never silently dropped
    pub fn new<R: Rng>(config: &PatchEmbedConfig, rng: &mut R) -> Result<Self, ShapeError> {
        let image_size = config.image_size.to_pair();
        let patch_size = config.patch_size.to_pair();

        if image_size.0 == 0 || image_size.1 == 0 {
            return Err(ShapeError::ZeroDimension("image_size"));
        }
        if patch_size.0 == 0 || patch_size.1 == 0 {
            return Err(ShapeError::ZeroDimension("patch_size"));
        }
        if image_size.0 % patch_size.0 != 0 || image_size.1 % patch_size.1 != 0 {
            return Err(ShapeError::NotDivisible {
                image: image_size,
                patch: patch_size,
            });
        }
        if config.channel_count == 0 {
            return Err(ShapeError::ZeroDimension("channel_count"));
        }
        if config.embed_dim == 0 {
            return Err(ShapeError::ZeroDimension("embed_dim"));
        }

        let proj = Conv2DLayer::new(
            config.channel_count,
            config.embed_dim,
            patch_size,
            Conv2DOptions {
                stride: patch_size,
                padding: (0, 0),
            },
            rng,
        )?;

        Ok(Self {
            image_size,
            patch_size,
            grid_size: (image_size.0 / patch_size.0, image_size.1 / patch_size.1),
            proj,
        })
    }

    pub fn image_size(&self) -> (usize, usize) {
        self.image_size
    }

    pub fn patch_size(&self) -> (usize, usize) {
        self.patch_size
    }

    /// Patches per column and per row: `(rows, cols)`.
    pub fn grid_size(&self) -> (usize, usize) {
        self.grid_size
    }

    /// Length of the produced sequence.
    pub fn patch_count(&self) -> usize {
        self.grid_size.0 * self.grid_size.1
    }

    pub fn channel_count(&self) -> usize {
        self.proj.in_channels()
    }

    pub fn embed_dim(&self) -> usize {
        self.proj.out_channels()
    }

    /// The underlying strided projection.
    pub fn projection(&self) -> &Conv2DLayer {
        &self.proj
    }

    pub fn projection_mut(&mut self) -> &mut Conv2DLayer {
        &mut self.proj
    }

    fn check_image(&self, images: &Array4<f32>) -> Result<(), ShapeError> {
        let (_, _, height, width) = images.dim();
        if (height, width) != self.image_size {
            return Err(ShapeError::ImageSize {
                expected: self.image_size,
                actual: (height, width),
            });
        }
        Ok(())
    }
}

impl Layer for PatchEmbedder {
    type Input = Array4<f32>;
    type Output = Array3<f32>;

    fn forward(&self, images: &Array4<f32>) -> Result<Array3<f32>, ShapeError> {
        self.check_image(images)?;
        let projected = self.proj.forward(images)?;
        let (batch, embed_dim, _, grid_w) = projected.dim();

        // [bs, C, gh, gw] -> [bs, C, N] -> [N, bs, C]
        Ok(Array3::from_shape_fn(
            (self.patch_count(), batch, embed_dim),
            |(patch, n, c)| projected[[n, c, patch / grid_w, patch % grid_w]],
        ))
    }

    fn backward(
        &self,
        images: &Array4<f32>,
        grad_output: &Array3<f32>,
    ) -> Result<Array4<f32>, ShapeError> {
        self.check_image(images)?;
        let batch = images.dim().0;
        let expected = (self.patch_count(), batch, self.embed_dim());
        if grad_output.dim() != expected {
            return Err(ShapeError::GradientShape {
                expected: vec![expected.0, expected.1, expected.2],
                actual: grad_output.shape().to_vec(),
            });
        }

        let (grid_h, grid_w) = self.grid_size;
        let grad_projected = Array4::from_shape_fn(
            (batch, self.embed_dim(), grid_h, grid_w),
            |(n, c, row, col)| grad_output[[row * grid_w + col, n, c]],
        );
        self.proj.backward(images, &grad_projected)
    }

    fn update_parameters(&mut self, optimizer: &mut dyn Optimizer) {
        self.proj.update_parameters(optimizer);
    }

    fn parameter_count(&self) -> usize {
        self.proj.parameter_count()
    }
}
