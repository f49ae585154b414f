use image::{imageops::FilterType, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use super::{expect_shape, resize, Prediction, Tensor};
use crate::errors::{GatewayError, Result};

pub const INPUT_SIZE: u32 = 224;

/// Crop species, indexed by model output position.
pub const CLASS_NAMES: [&str; 5] = ["Jute", "Maize", "Rice", "Sugarcane", "Wheat"];

pub const INPUT_SHAPE: [usize; 4] = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
pub const OUTPUT_SHAPE: [usize; 2] = [1, CLASS_NAMES.len()];

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const VIT_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
const VIT_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// VGG16 backbone: ImageNet statistics.
pub fn preprocess_vgg16(image: &RgbImage) -> Result<Tensor> {
    Ok(normalize(image, IMAGENET_MEAN, IMAGENET_STD))
}

/// ViT backbone: symmetric [-1, 1] scaling.
pub fn preprocess_vit(image: &RgbImage) -> Result<Tensor> {
    Ok(normalize(image, VIT_MEAN, VIT_STD))
}

fn normalize(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Tensor {
    let image = resize(image, INPUT_SIZE, FilterType::CatmullRom);
    let mut tensor = image
        .as_ndarray3()
        .mapv(|v| f32::from(v) / 255.0)
        .insert_axis(Axis(0));

    for (mut plane, (m, s)) in tensor
        .axis_iter_mut(Axis(1))
        .zip(mean.into_iter().zip(std))
    {
        plane.mapv_inplace(|v| (v - m) / s);
    }

    tensor.into_dyn()
}

pub fn postprocess(output: ArrayViewD<f32>, _original: &RgbImage) -> Result<Prediction> {
    expect_shape(&output, &OUTPUT_SHAPE, "classifier")?;

    let logits = output.iter().copied().collect::<Vec<_>>();
    let index = argmax(&logits).ok_or_else(|| GatewayError::ModelOutput {
        model: "classifier".to_string(),
        expected: OUTPUT_SHAPE.to_vec(),
        actual: output.shape().to_vec(),
    })?;

    Ok(Prediction::Label {
        index,
        name: class_name(index)?,
    })
}

/// Position of the largest value; the first one wins on ties.
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, max)) if v <= max => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// An index outside the table means the artifact and the table disagree, which is a
/// deployment fault and never the caller's.
pub fn class_name(index: usize) -> Result<&'static str> {
    CLASS_NAMES
        .get(index)
        .copied()
        .ok_or_else(|| GatewayError::Configuration {
            message: format!(
                "class index {index} outside the {}-entry class table",
                CLASS_NAMES.len()
            ),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn logits(values: [f32; 5]) -> ArrayD<f32> {
        Array::from_shape_vec(IxDyn(&OUTPUT_SHAPE), values.to_vec()).unwrap()
    }

    #[test]
    fn test_vgg16_black_image_is_negative_mean_over_std() -> Result<()> {
        let image = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let tensor = preprocess_vgg16(&image)?;
        assert_eq!(tensor.shape(), &INPUT_SHAPE);

        for c in 0..3 {
            let expected = -IMAGENET_MEAN[c] / IMAGENET_STD[c];
            let plane = tensor.index_axis(Axis(1), c);
            assert!(plane.iter().all(|&v| (v - expected).abs() < 1e-5));
        }
        Ok(())
    }

    #[test]
    fn test_vit_scales_to_unit_range() -> Result<()> {
        let white = preprocess_vit(&RgbImage::from_pixel(300, 200, Rgb([255, 255, 255])))?;
        assert_eq!(white.shape(), &INPUT_SHAPE);
        assert!(white.iter().all(|&v| (v - 1.0).abs() < 1e-5));

        let black = preprocess_vit(&RgbImage::from_pixel(50, 50, Rgb([0, 0, 0])))?;
        assert!(black.iter().all(|&v| (v + 1.0).abs() < 1e-5));
        Ok(())
    }

    #[test]
    fn test_channel_first_layout() -> Result<()> {
        let image = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([255, 0, 0]));
        let tensor = preprocess_vit(&image)?.into_dimensionality::<Ix4>()?;
        assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 1e-5);
        assert!((tensor[[0, 1, 10, 10]] + 1.0).abs() < 1e-5);
        assert!((tensor[[0, 2, 10, 10]] + 1.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_argmax_finds_unique_maximum_in_every_position() -> Result<()> {
        let original = RgbImage::new(1, 1);
        for position in 0..CLASS_NAMES.len() {
            let mut values = [0.1, -2.0, 0.3, 0.0, -0.5];
            values[position] = 5.0;
            let prediction = postprocess(logits(values).view(), &original)?;
            assert_eq!(
                prediction,
                Prediction::Label {
                    index: position,
                    name: CLASS_NAMES[position],
                }
            );
        }
        Ok(())
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_wrong_output_shape_is_rejected() {
        let output = ArrayD::<f32>::zeros(IxDyn(&[1, 7]));
        let result = postprocess(output.view(), &RgbImage::new(1, 1));
        assert!(matches!(result, Err(GatewayError::ModelOutput { .. })));
    }

    #[test]
    fn test_class_name_lookup() {
        assert_eq!(class_name(3).unwrap(), "Sugarcane");
        assert!(matches!(
            class_name(5),
            Err(GatewayError::Configuration { .. })
        ));
    }
}
