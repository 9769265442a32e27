//! Eyescan Core - Domain types and inference for the eye-disease classifiers
//!
//! This crate contains the EfficientNet-based retinopathy and pink-eye networks,
//! the non-strict weight loader, image preprocessing, decision rules and the
//! input-gradient saliency renderer.

pub mod domain;
pub mod inference;

pub use domain::{LoadOutcome, ModelsLoaded, Prediction, SaliencyReport};
pub use inference::{
    get_device, Architecture, DecisionRule, DecodeError, Diagnoser, ModelSlot, PinkEyeNet,
    RetinopathyNet,
};
