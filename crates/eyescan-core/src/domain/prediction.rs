//! Per-request classification results.

use std::collections::BTreeMap;

use image::RgbImage;
use serde::Serialize;

/// Outcome of classifying one image.
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// Human-readable label of the predicted class.
    #[serde(rename = "prediction")]
    pub label: &'static str,
    /// Probability of the predicted class, in `[0, 1]`.
    pub confidence: f32,
    /// Index of the predicted class.
    pub class_index: usize,
    /// Probability of every class, keyed by label.
    #[serde(rename = "all_probabilities")]
    pub probabilities: BTreeMap<&'static str, f32>,
}

impl Prediction {
    /// Builds a prediction from per-class probabilities and the chosen index.
    ///
    /// Confidence is the chosen class's probability.
    #[must_use]
    pub fn from_probabilities(labels: [&'static str; 2], probabilities: [f32; 2], class_index: usize) -> Self {
        Self {
            label: labels[class_index],
            confidence: probabilities[class_index],
            class_index,
            probabilities: labels.into_iter().zip(probabilities).collect(),
        }
    }
}

/// A prediction together with its gradient-saliency overlay.
#[derive(Debug, Clone)]
pub struct SaliencyReport {
    /// Prediction computed from the same forward pass that produced the gradients.
    pub prediction: Prediction,
    /// Heatmap blended over the original image, same pixel dimensions as the input.
    pub overlay: RgbImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_probabilities() {
        let p = Prediction::from_probabilities(["no", "yes"], [0.25, 0.75], 1);
        assert_eq!(p.label, "yes");
        assert!((p.confidence - 0.75).abs() < f32::EPSILON);
        assert_eq!(p.probabilities.len(), 2);
        assert!((p.probabilities["no"] - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_serialized_field_names() {
        let p = Prediction::from_probabilities(["Normal", "Conjunctivitis Detected"], [0.9, 0.1], 0);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["prediction"], "Normal");
        assert_eq!(json["class_index"], 0);
        assert!(json["all_probabilities"]["Conjunctivitis Detected"].is_number());
        assert!(json.get("label").is_none());
    }
}
