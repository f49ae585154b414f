use std::io::Cursor;

use image::codecs::png::PngEncoder;
use image::{ImageBuffer, ImageReader, Pixel, PixelWithColorType, RgbImage};

use crate::errors::{GatewayError, Result};

/// Decode uploaded bytes into an RGB pixel grid.
///
/// The format is sniffed from the content, never from a file name. Alpha is dropped and
/// grayscale is promoted to three channels.
pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(GatewayError::Decode {
            reason: "empty payload".to_string(),
        });
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| GatewayError::Decode {
            reason: e.to_string(),
        })?;
    if reader.format().is_none() {
        return Err(GatewayError::Decode {
            reason: "unrecognised image format".to_string(),
        });
    }

    Ok(reader.decode()?.into_rgb8())
}

/// Encode an 8-bit RGB or luma grid as PNG.
pub fn encode_png<P>(image: &ImageBuffer<P, Vec<u8>>) -> Result<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + PixelWithColorType,
{
    let mut bytes = Vec::new();
    image
        .write_with_encoder(PngEncoder::new(&mut bytes))
        .map_err(|e| GatewayError::unexpected("png encoding", e))?;
    Ok(bytes)
}
