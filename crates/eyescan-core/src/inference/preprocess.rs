//! Image decoding and input tensor preparation.

// Allow common ML/image code patterns
#![allow(clippy::cast_possible_truncation)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::DynamicImage;
use thiserror::Error;

/// Square input resolution of both networks.
pub const INPUT_SIZE: usize = 224;

/// Per-channel `ImageNet` mean.
pub const MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel `ImageNet` standard deviation.
pub const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Malformed image payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No comma separating the data-URL header from the payload.
    #[error("image is not a data URL (expected 'data:<mime>;base64,<data>')")]
    NotDataUrl,
    /// Nothing after the comma.
    #[error("image payload is empty")]
    Empty,
    /// Payload is not valid base64.
    #[error("invalid base64 image payload: {0}")]
    Base64(#[from] base64::DecodeError),
    /// Bytes are not a supported image.
    #[error("cannot identify image: {0}")]
    Image(#[from] image::ImageError),
}

/// Decodes a `data:<mime>;base64,<data>` string into an RGB image.
///
/// Only the text after the first comma is used; the header is not checked.
///
/// # Errors
///
/// Returns a [`DecodeError`] if the string has no comma, the payload is empty,
/// the base64 is invalid, or the bytes are not a decodable image.
pub fn decode_data_url(data_url: &str) -> Result<DynamicImage, DecodeError> {
    let (_, payload) = data_url.split_once(',').ok_or(DecodeError::NotDataUrl)?;
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = STANDARD.decode(payload)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// Converts an image to a normalized `(1, 3, 224, 224)` tensor.
///
/// # Errors
///
/// Returns an error if tensor creation fails.
pub fn to_input_tensor(image: &DynamicImage, device: &Device) -> candle_core::Result<Tensor> {
    let side = INPUT_SIZE as u32;
    let resized = image::imageops::resize(&image.to_rgb8(), side, side, FilterType::Triangle);

    let plane = INPUT_SIZE * INPUT_SIZE;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
        let offset = y as usize * INPUT_SIZE + x as usize;
        for c in 0..3 {
            let value = f32::from(pixel[c]) / 255.0;
            data[c * plane + offset] = (value - MEAN[c]) / STD[c];
        }
    }

    Tensor::from_vec(data, (1, 3, INPUT_SIZE, INPUT_SIZE), device)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_data_url(img: &RgbImage) -> String {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(bytes))
    }

    #[test]
    fn test_decode_red_pixel() {
        let img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let decoded = decode_data_url(&png_data_url(&img)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (1, 1));
        assert_eq!(decoded.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_header_is_not_validated() {
        let img = RgbImage::from_pixel(2, 3, Rgb([1, 2, 3]));
        let url = png_data_url(&img).replacen("data:image/png;base64", "whatever", 1);
        assert!(decode_data_url(&url).is_ok());
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode_data_url("no comma here"), Err(DecodeError::NotDataUrl)));
        assert!(matches!(decode_data_url("data:image/png;base64,"), Err(DecodeError::Empty)));
        assert!(matches!(decode_data_url("data:image/png;base64,@@@"), Err(DecodeError::Base64(_))));
        assert!(matches!(
            decode_data_url(&format!("data:text/plain;base64,{}", STANDARD.encode("hello"))),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn test_input_tensor_normalization() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(7, 5, Rgb([255, 0, 128])));
        let t = to_input_tensor(&img, &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);

        let v = t.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let plane = INPUT_SIZE * INPUT_SIZE;
        let expected = [
            (1.0 - MEAN[0]) / STD[0],
            (0.0 - MEAN[1]) / STD[1],
            (128.0 / 255.0 - MEAN[2]) / STD[2],
        ];
        for c in 0..3 {
            assert!((v[c * plane] - expected[c]).abs() < 1e-4, "channel {c}");
            assert!((v[c * plane + plane - 1] - expected[c]).abs() < 1e-4, "channel {c}");
        }
    }
}
