//! Core domain types shared by the inference layer and the HTTP façade.

mod prediction;
mod status;

pub use prediction::{Prediction, SaliencyReport};
pub use status::{LoadOutcome, ModelsLoaded};
