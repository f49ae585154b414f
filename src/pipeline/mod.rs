//! Per-task numeric transforms.
//!
//! Every pipeline is a pair of pure functions: a preprocessor turning a decoded RGB grid
//! into the exact tensor its model was trained on, and a postprocessor turning the model
//! output back into a [`Prediction`]. Shapes and value ranges are fixed per pipeline.

pub mod classify;
pub mod colorize;
pub mod flood;
pub mod overlay;

use image::{imageops, imageops::FilterType, GrayImage, RgbImage};
use ndarray::prelude::*;

use crate::errors::{GatewayError, Result};

pub type Tensor = ArrayD<f32>;

/// Decoded image → model input tensor.
pub type PreprocessFn = fn(&RgbImage) -> Result<Tensor>;

/// Model output tensor (plus the decoded input, for overlays) → prediction.
pub type PostprocessFn = fn(ArrayViewD<f32>, &RgbImage) -> Result<Prediction>;

/// Task-specific result before response encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    Label {
        index: usize,
        name: &'static str,
    },
    Colorized(RgbImage),
    Flood {
        mask: GrayImage,
        overlay: RgbImage,
        flood_detected: bool,
    },
}

pub(crate) fn resize(image: &RgbImage, size: u32, filter: FilterType) -> RgbImage {
    imageops::resize(image, size, size, filter)
}

/// Rejects a model output whose shape differs from the one the postprocessor was written
/// against.
pub(crate) fn expect_shape(output: &ArrayViewD<f32>, expected: &[usize], model: &str) -> Result<()> {
    if output.shape() == expected {
        Ok(())
    } else {
        Err(GatewayError::ModelOutput {
            model: model.to_string(),
            expected: expected.to_vec(),
            actual: output.shape().to_vec(),
        })
    }
}
