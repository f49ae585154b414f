use image::{imageops::FilterType, GrayImage, Luma, Rgb, RgbImage};
use ndarray::prelude::*;

use super::{expect_shape, overlay, resize, Prediction, Tensor};
use crate::errors::Result;

pub const INPUT_SIZE: u32 = 256;
pub const PATCH_SIZE: usize = 16;

const GRID: usize = INPUT_SIZE as usize / PATCH_SIZE;

pub const INPUT_SHAPE: [usize; 3] = [1, GRID * GRID, PATCH_SIZE * PATCH_SIZE * 3];
pub const OUTPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE as usize, INPUT_SIZE as usize, 1];

pub const THRESHOLD: f32 = 0.5;
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OUTLINE_WIDTH: u32 = 2;

/// Cut the resized image into non-overlapping 16×16 patches.
///
/// Patches are ordered row-major over the patch grid; each patch is flattened as
/// (row, column, channel).
pub fn preprocess(image: &RgbImage) -> Result<Tensor> {
    let side = INPUT_SIZE as usize;
    let image = resize(image, INPUT_SIZE, FilterType::Triangle);
    let pixels = Array3::from_shape_vec((side, side, 3), image.into_raw())?
        .mapv(|v| f32::from(v) / 255.0);

    let patches = pixels
        .into_shape_with_order((GRID, PATCH_SIZE, GRID, PATCH_SIZE, 3))?
        .permuted_axes([0, 2, 1, 3, 4])
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((1, GRID * GRID, PATCH_SIZE * PATCH_SIZE * 3))?;

    Ok(patches.into_dyn())
}

pub fn postprocess(output: ArrayViewD<f32>, original: &RgbImage) -> Result<Prediction> {
    expect_shape(&output, &OUTPUT_SHAPE, "flood segmenter")?;
    let probabilities = output
        .into_dimensionality::<Ix4>()?
        .index_axis_move(Axis(0), 0)
        .index_axis_move(Axis(2), 0);

    let mask = threshold_mask(probabilities);
    let flood_detected = is_flood_detected(&mask);

    let mut overlay = resize(original, INPUT_SIZE, FilterType::Triangle);
    let contours = overlay::external_contours(&mask);
    overlay::draw_contours(&mut overlay, &contours, OUTLINE_COLOR, OUTLINE_WIDTH);

    Ok(Prediction::Flood {
        mask,
        overlay,
        flood_detected,
    })
}

/// Binary mask scaled to {0, 255}.
pub fn threshold_mask(probabilities: ArrayView2<f32>) -> GrayImage {
    let (height, width) = probabilities.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let flooded = probabilities[[y as usize, x as usize]] > THRESHOLD;
        Luma([if flooded { 255 } else { 0 }])
    })
}

pub fn is_flood_detected(mask: &GrayImage) -> bool {
    mask.pixels().any(|Luma([v])| *v != 0)
}
