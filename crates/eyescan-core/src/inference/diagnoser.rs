//! Image in, labeled prediction out.
//!
//! A [`Diagnoser`] pairs a network with the rule that turns its logits into
//! class probabilities, and with the human-readable labels of its two classes.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use candle_core::{Device, Module, Tensor, Var};
use image::DynamicImage;
use tracing::debug;

use super::preprocess::to_input_tensor;
use super::saliency::{render_overlay, saliency_map};
use super::utils::{sigmoid, softmax2};
use super::{PinkEyeNet, RetinopathyNet};
use crate::domain::{Prediction, SaliencyReport};

/// Labels of the retinopathy classifier, by class index.
pub const RETINOPATHY_CLASSES: [&str; 2] = ["No Diabetic Retinopathy", "Diabetic Retinopathy Detected"];

/// Labels of the pink-eye classifier, by class index.
pub const PINK_EYE_CLASSES: [&str; 2] = ["Normal", "Conjunctivitis Detected"];

/// How logits become a class decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionRule {
    /// One logit `z`; `p = sigmoid(z)` is the probability of class 1, and
    /// class 1 wins only when `p > 0.5`.
    Sigmoid,
    /// Two logits; softmax probabilities, argmax with ties to class 0.
    Softmax,
}

impl DecisionRule {
    /// Applies the rule to one row of logits.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of logits does not fit the rule.
    pub fn decide(self, logits: &[f32], labels: [&'static str; 2]) -> Result<Prediction> {
        match self {
            Self::Sigmoid => {
                let &[logit] = logits else {
                    bail!("Sigmoid rule expects 1 logit, got {}", logits.len());
                };
                let p = sigmoid(logit);
                let class_index = usize::from(p > 0.5);
                Ok(Prediction::from_probabilities(labels, [1.0 - p, p], class_index))
            }
            Self::Softmax => {
                let &[a, b] = logits else {
                    bail!("Softmax rule expects 2 logits, got {}", logits.len());
                };
                let probabilities = softmax2([a, b]);
                let class_index = usize::from(probabilities[1] > probabilities[0]);
                Ok(Prediction::from_probabilities(labels, probabilities, class_index))
            }
        }
    }

    /// Logit whose gradient drives the saliency map.
    ///
    /// The single sigmoid logit regardless of the decision; the predicted
    /// class logit under softmax.
    #[must_use]
    pub const fn saliency_target(self, prediction: &Prediction) -> usize {
        match self {
            Self::Sigmoid => 0,
            Self::Softmax => prediction.class_index,
        }
    }
}

/// A loaded classifier ready to serve requests.
///
/// Cheap to clone; the network is shared.
#[derive(Clone)]
pub struct Diagnoser {
    model: Arc<dyn Module + Send + Sync>,
    rule: DecisionRule,
    labels: [&'static str; 2],
    device: Device,
}

impl Diagnoser {
    /// Wraps an arbitrary network.
    pub fn new(
        model: Arc<dyn Module + Send + Sync>,
        rule: DecisionRule,
        labels: [&'static str; 2],
        device: Device,
    ) -> Self {
        Self {
            model,
            rule,
            labels,
            device,
        }
    }

    /// The diabetic retinopathy classifier.
    pub fn retinopathy(model: RetinopathyNet, device: &Device) -> Self {
        Self::new(Arc::new(model), DecisionRule::Sigmoid, RETINOPATHY_CLASSES, device.clone())
    }

    /// The conjunctivitis classifier.
    pub fn pinkeye(model: PinkEyeNet, device: &Device) -> Self {
        Self::new(Arc::new(model), DecisionRule::Softmax, PINK_EYE_CLASSES, device.clone())
    }

    /// Classifies one image.
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing or the forward pass fails.
    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let input = to_input_tensor(image, &self.device)?;
        let logits = self.model.forward(&input).context("Forward pass failed")?;
        self.decide(&logits)
    }

    /// Classifies one image and renders where the target logit is most
    /// sensitive to the input pixels.
    ///
    /// Prediction and gradients come from the same forward pass.
    ///
    /// # Errors
    ///
    /// Returns an error if preprocessing, the forward or backward pass, or
    /// rendering fails.
    pub fn explain(&self, image: &DynamicImage) -> Result<SaliencyReport> {
        let input = Var::from_tensor(&to_input_tensor(image, &self.device)?)?;
        let logits = self
            .model
            .forward(input.as_tensor())
            .context("Forward pass failed")?;
        let prediction = self.decide(&logits)?;

        let target = self.rule.saliency_target(&prediction);
        debug!("Saliency target logit {target} for '{}'", prediction.label);
        let grads = logits.get(0)?.get(target)?.backward()?;
        let gradient = grads
            .get(input.as_tensor())
            .context("Input received no gradient")?;

        let map = saliency_map(gradient)?;
        let overlay = render_overlay(&image.to_rgb8(), &map)?;
        Ok(SaliencyReport {
            prediction,
            overlay,
        })
    }

    fn decide(&self, logits: &Tensor) -> Result<Prediction> {
        let row = logits
            .get(0)
            .and_then(|r| r.flatten_all())
            .and_then(|r| r.to_vec1::<f32>())
            .context("Unexpected logits shape")?;
        self.rule.decide(&row, self.labels)
    }
}

impl std::fmt::Debug for Diagnoser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnoser")
            .field("rule", &self.rule)
            .field("labels", &self.labels)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
