//! Synthetic image builders for testing.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

/// Builder for creating synthetic test images.
pub struct SyntheticImageBuilder;

impl SyntheticImageBuilder {
    /// A single pure red pixel.
    #[must_use]
    pub fn red_pixel() -> DynamicImage {
        Self::solid(1, 1, [255, 0, 0])
    }

    /// Creates an image filled with one color.
    #[must_use]
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
    }

    /// Creates a horizontal gray ramp, black on the left.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn horizontal_gradient(width: u32, height: u32) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, _| {
            let v = ((u32::from(u8::MAX) * x) / width.saturating_sub(1).max(1)) as u8;
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    /// Encodes `image` in `format` and returns the raw bytes.
    ///
    /// # Panics
    ///
    /// Panics if the image cannot be encoded in `format`.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), format)
            .expect("encoding a synthetic image");
        bytes
    }

    /// Wraps `image` as `data:image/png;base64,...`.
    #[must_use]
    pub fn png_data_url(image: &DynamicImage) -> String {
        Self::data_url(image, ImageFormat::Png)
    }

    /// Wraps `image` as a data URL in `format`.
    #[must_use]
    pub fn data_url(image: &DynamicImage, format: ImageFormat) -> String {
        format!(
            "data:{};base64,{}",
            format.to_mime_type(),
            STANDARD.encode(Self::encode(image, format))
        )
    }
}
