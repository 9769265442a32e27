//! Inference engine using Candle.
//!
//! Provides:
//! - EfficientNet backbones in torchvision and timm parameter layouts
//! - The retinopathy (B4) and pink-eye (B0) classifiers
//! - Non-strict weight loading with full/partial/failed classification
//! - Preprocessing, decision rules and input-gradient saliency

mod device;
mod diagnoser;
mod efficientnet;
mod loader;
mod pinkeye;
mod preprocess;
mod retinopathy;
mod saliency;
mod utils;
mod weights;

pub use device::{describe_device, get_device};
pub use diagnoser::{DecisionRule, Diagnoser, PINK_EYE_CLASSES, RETINOPATHY_CLASSES};
pub use efficientnet::{EfficientNet, Layout, Variant};
pub use loader::{load_architecture, Architecture, LoadReport, ModelSlot};
pub use pinkeye::PinkEyeNet;
pub use preprocess::{decode_data_url, to_input_tensor, DecodeError, INPUT_SIZE, MEAN, STD};
pub use retinopathy::RetinopathyNet;
pub use saliency::{
    blend, encode_png_data_url, jet, normalize_saliency, render_overlay, saliency_map, SaliencyMap,
    BLEND_HEATMAP, BLEND_ORIGINAL,
};
pub use utils::{sigmoid, sigmoid_tensor, softmax2};
pub use weights::{read_state_dict, STATE_DICT_KEY};
