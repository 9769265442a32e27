//! Input-gradient saliency rendering.
//!
//! The gradient of the target logit with respect to the input tensor is reduced
//! to one value per pixel (largest absolute value across channels), min-max
//! normalized, upscaled to the original image, colored with a jet scale and
//! blended over the original.

// Allow common ML/image code patterns
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use candle_core::Tensor;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, ImageFormat, Luma, Rgb, RgbImage};

/// Weight of the original image in the overlay.
pub const BLEND_ORIGINAL: f32 = 0.6;

/// Weight of the heatmap in the overlay.
pub const BLEND_HEATMAP: f32 = 0.4;

/// Keeps normalization finite for constant maps.
const NORMALIZE_EPSILON: f32 = 1e-8;

/// Single-channel saliency values in `[0, 1]`.
pub type SaliencyMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Reduces a `(1, 3, H, W)` input gradient to a normalized `H x W` map.
///
/// # Errors
///
/// Returns an error if the gradient does not have a single-sample NCHW shape.
pub fn saliency_map(gradient: &Tensor) -> Result<SaliencyMap> {
    let map = gradient
        .abs()?
        .max(1)?
        .squeeze(0)
        .context("Gradient must have a single sample")?;
    let (height, width) = map.dims2()?;

    let mut values = map.flatten_all()?.to_vec1::<f32>()?;
    normalize_saliency(&mut values);

    ImageBuffer::from_raw(width as u32, height as u32, values)
        .context("Saliency buffer does not match its dimensions")
}

/// Min-max normalizes in place. A constant map becomes all zeros.
pub fn normalize_saliency(values: &mut [f32]) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let denom = max - min + NORMALIZE_EPSILON;
    for v in values.iter_mut() {
        *v = (*v - min) / denom;
    }
}

/// Jet color scale: dark blue at 0, through cyan, yellow, to dark red at 255.
#[must_use]
pub fn jet(level: u8) -> Rgb<u8> {
    let x = f32::from(level) / 255.0;
    let channel = |offset: f32| {
        let level = (1.5 - 4.0f32.mul_add(x, -offset).abs()).clamp(0.0, 1.0);
        (level * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

/// Blends two equally sized images, `60%` original and `40%` heatmap.
///
/// # Errors
///
/// Returns an error if the dimensions differ.
pub fn blend(original: &RgbImage, heatmap: &RgbImage) -> Result<RgbImage> {
    anyhow::ensure!(
        original.dimensions() == heatmap.dimensions(),
        "Cannot blend {:?} with {:?}",
        original.dimensions(),
        heatmap.dimensions()
    );

    let (width, height) = original.dimensions();
    let data = original
        .as_raw()
        .iter()
        .zip(heatmap.as_raw())
        .map(|(&a, &b)| {
            BLEND_ORIGINAL
                .mul_add(f32::from(a), BLEND_HEATMAP * f32::from(b))
                .round()
                .clamp(0.0, 255.0) as u8
        })
        .collect();

    RgbImage::from_raw(width, height, data).context("Blended buffer does not match its dimensions")
}

/// Upscales `map` to the original image, colors it, and blends it over `original`.
///
/// # Errors
///
/// Returns an error if blending fails.
pub fn render_overlay(original: &RgbImage, map: &SaliencyMap) -> Result<RgbImage> {
    let (width, height) = original.dimensions();
    let resized = image::imageops::resize(map, width, height, FilterType::Triangle);

    let heatmap = RgbImage::from_fn(width, height, |x, y| {
        let value = resized.get_pixel(x, y)[0];
        jet((255.0 * value) as u8)
    });

    blend(original, &heatmap)
}

/// Encodes an image as `data:image/png;base64,...`.
///
/// # Errors
///
/// Returns an error if PNG encoding fails.
pub fn encode_png_data_url(image: &RgbImage) -> Result<String> {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("Failed to encode overlay as PNG")?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}
