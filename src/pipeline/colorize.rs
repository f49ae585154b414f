use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use super::{expect_shape, resize, Prediction, Tensor};
use crate::errors::Result;

pub const INPUT_SIZE: u32 = 256;
pub const INPUT_SHAPE: [usize; 4] = [1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
pub const OUTPUT_SHAPE: [usize; 4] = INPUT_SHAPE;

/// SAR image → [-1, 1] channel-first tensor.
pub fn preprocess(image: &RgbImage) -> Result<Tensor> {
    let image = resize(image, INPUT_SIZE, FilterType::Triangle);
    Ok(image
        .as_ndarray3()
        .mapv(|v| f32::from(v) / 127.5 - 1.0)
        .insert_axis(Axis(0))
        .into_dyn())
}

pub fn postprocess(output: ArrayViewD<f32>, _original: &RgbImage) -> Result<Prediction> {
    expect_shape(&output, &OUTPUT_SHAPE, "colorizer")?;
    let chw = output.into_dimensionality::<Ix4>()?.index_axis_move(Axis(0), 0);
    let (height, width) = (chw.shape()[1], chw.shape()[2]);

    let image = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            to_pixel(chw[[0, y, x]]),
            to_pixel(chw[[1, y, x]]),
            to_pixel(chw[[2, y, x]]),
        ])
    });
    Ok(Prediction::Colorized(image))
}

/// Inverse of the preprocessing scale; truncates like an unsigned cast.
fn to_pixel(value: f32) -> u8 {
    ((value + 1.0) * 127.5).clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_gray_survives_identity_model() -> Result<()> {
        let gray = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([128, 128, 128]));
        let tensor = preprocess(&gray)?;
        assert_eq!(tensor.shape(), &INPUT_SHAPE);

        let Prediction::Colorized(image) = postprocess(tensor.view(), &gray)? else {
            panic!("colorizer must produce an image");
        };
        assert_eq!(image.dimensions(), (INPUT_SIZE, INPUT_SIZE));
        assert!(image
            .pixels()
            .all(|p| p.0.iter().all(|&c| c.abs_diff(128) <= 1)));
        Ok(())
    }

    #[test]
    fn test_preprocess_range() -> Result<()> {
        let image = RgbImage::from_fn(40, 30, |x, y| Rgb([(x * 6) as u8, (y * 8) as u8, 255]));
        let tensor = preprocess(&image)?;
        assert!(tensor.iter().all(|&v| (-1.0..=1.0).contains(&v)));
        Ok(())
    }

    #[test]
    fn test_output_is_clamped() -> Result<()> {
        let mut output = ArrayD::<f32>::zeros(IxDyn(&OUTPUT_SHAPE));
        output.slice_mut(s![0, 0, .., ..]).fill(7.5);
        output.slice_mut(s![0, 1, .., ..]).fill(-3.0);
        output.slice_mut(s![0, 2, .., ..]).fill(f32::NAN);

        let Prediction::Colorized(image) = postprocess(output.view(), &RgbImage::new(1, 1))? else {
            panic!("colorizer must produce an image");
        };
        assert!(image.pixels().all(|p| p.0 == [255, 0, 0]));
        Ok(())
    }

    #[test]
    fn test_channel_order_is_preserved() -> Result<()> {
        let mut output = ArrayD::<f32>::from_elem(IxDyn(&OUTPUT_SHAPE), -1.0);
        output.slice_mut(s![0, 2, 5, 9]).fill(1.0);

        let Prediction::Colorized(image) = postprocess(output.view(), &RgbImage::new(1, 1))? else {
            panic!("colorizer must produce an image");
        };
        assert_eq!(image.get_pixel(9, 5), &Rgb([0, 0, 255]));
        assert_eq!(image.get_pixel(5, 9), &Rgb([0, 0, 0]));
        Ok(())
    }
}
