//! Integration tests for loading and running the full-size networks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use eyescan_core::inference::read_state_dict;
use eyescan_core::{Architecture, Diagnoser, LoadOutcome, ModelSlot, PinkEyeNet, RetinopathyNet};
use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;

fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let r = u8::try_from(x * 255 / width.max(1)).unwrap_or(u8::MAX);
        let g = u8::try_from(y * 255 / height.max(1)).unwrap_or(u8::MAX);
        Rgb([r, g, 128])
    });
    DynamicImage::ImageRgb8(img)
}

/// Writes freshly initialised `PinkEyeNet` weights under their checkpoint keys.
fn save_pinkeye(dir: &Path) -> std::path::PathBuf {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    PinkEyeNet::build(vb).expect("declare pink-eye parameters");
    let path = dir.join("pinkeye.safetensors");
    varmap.save(&path).expect("save weights");
    path
}

#[test]
fn test_pinkeye_weights_load_fully() {
    let dir = TempDir::new().unwrap();
    let path = save_pinkeye(dir.path());

    let slot = ModelSlot::<PinkEyeNet>::load(&path, &Device::Cpu);
    assert!(slot.is_loaded());
    assert_eq!(slot.outcome(), &LoadOutcome::Full);
}

#[test]
fn test_pinkeye_extra_key_is_partial() {
    let dir = TempDir::new().unwrap();
    let path = save_pinkeye(dir.path());

    let mut state: HashMap<String, Tensor> = read_state_dict(&path, &Device::Cpu).unwrap();
    state.insert(
        "projection.weight".to_string(),
        Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap(),
    );
    let extended = dir.path().join("pinkeye_extended.safetensors");
    candle_core::safetensors::save(&state, &extended).unwrap();

    let slot = ModelSlot::<PinkEyeNet>::load(&extended, &Device::Cpu);
    assert!(slot.is_loaded());
    assert_eq!(slot.outcome(), &LoadOutcome::Partial { unexpected: 1 });
}

#[test]
fn test_loaded_pinkeye_explains_tiny_image() {
    let dir = TempDir::new().unwrap();
    let path = save_pinkeye(dir.path());
    let slot = ModelSlot::<PinkEyeNet>::load(&path, &Device::Cpu)
        .map(|net| Diagnoser::pinkeye(net, &Device::Cpu));
    let diagnoser = slot.get().expect("pink-eye model loaded");

    let image = gradient_image(5, 3);
    let report = diagnoser.explain(&image).unwrap();

    assert_eq!(report.overlay.dimensions(), (5, 3));
    let total: f32 = report.prediction.probabilities.values().sum();
    assert!((total - 1.0).abs() < 1e-4, "probabilities sum to {total}");

    let prediction = diagnoser.predict(&image).unwrap();
    assert_eq!(prediction.label, report.prediction.label);
    assert!((prediction.confidence - report.prediction.confidence).abs() < 1e-5);
}

#[test]
fn test_retinopathy_explain_keeps_input_size() {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let net = RetinopathyNet::build(vb).unwrap();
    let diagnoser = Diagnoser::retinopathy(net, &Device::Cpu);

    let image = gradient_image(50, 40);
    let report = diagnoser.explain(&image).unwrap();
    assert_eq!(report.overlay.dimensions(), (50, 40));

    let prediction = diagnoser.predict(&image).unwrap();
    assert_eq!(prediction.class_index, report.prediction.class_index);
    assert!((prediction.confidence - report.prediction.confidence).abs() < 1e-5);
}
