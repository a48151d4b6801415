//! Layer abstractions for neural networks
//!
//! This module provides the Layer trait, the strided convolution and the ViT
//! patch embedding built on top of it.

mod r#trait;
pub mod conv2d;
pub mod patch_embed;

// Re-export the Layer trait for convenience
pub use r#trait::Layer;
pub use conv2d::{Conv2DLayer, Conv2DOptions};
pub use patch_embed::PatchEmbedder;
