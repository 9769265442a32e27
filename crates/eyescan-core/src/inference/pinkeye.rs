//! Conjunctivitis (pink eye) classifier.
//!
//! timm `EfficientNet`-B0 features, a learned scalar attention gate over the
//! feature vector, then a two-logit head.

use anyhow::Result;
use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, Linear, VarBuilder};

use super::efficientnet::{EfficientNet, Layout, Variant};
use super::loader::Architecture;
use super::sigmoid_tensor;

const BN_EPS: f64 = 1e-5;

/// Pink-eye network. Output shape `(batch, 2)`.
pub struct PinkEyeNet {
    backbone: EfficientNet,
    attention_fc1: Linear,
    attention_fc2: Linear,
    fc1: Linear,
    bn: BatchNorm,
    out: Linear,
}

impl PinkEyeNet {
    /// Per-sample attention weight in `(0, 1)`, shape `(batch, 1)`.
    fn gate(&self, features: &Tensor) -> candle_core::Result<Tensor> {
        let g = self.attention_fc1.forward(features)?.relu()?;
        let g = self.attention_fc2.forward(&g)?;
        sigmoid_tensor(&g)
    }
}

impl Architecture for PinkEyeNet {
    const NAME: &'static str = "Pink eye";

    fn build(vb: VarBuilder) -> Result<Self> {
        let backbone = EfficientNet::new(&vb.pp("backbone"), Layout::Timm, Variant::B0)?;
        let width = backbone.out_channels();

        // attention: Linear, ReLU, Linear
        let attention_fc1 = linear(width, width / 4, vb.pp("attention.0"))?;
        let attention_fc2 = linear(width / 4, 1, vb.pp("attention.2"))?;

        // classifier: Dropout(0.3), Linear, ReLU, BN, Dropout(0.3), Linear
        let head = vb.pp("classifier");
        let fc1 = linear(width, width / 2, head.pp("1"))?;
        let bn = batch_norm(width / 2, BN_EPS, head.pp("3"))?;
        let out = linear(width / 2, 2, head.pp("5"))?;

        Ok(Self {
            backbone,
            attention_fc1,
            attention_fc2,
            fc1,
            bn,
            out,
        })
    }
}

impl Module for PinkEyeNet {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let features = self.backbone.forward(x)?;
        let attended = features.broadcast_mul(&self.gate(&features)?)?;

        let x = self.fc1.forward(&attended)?.relu()?;
        let x = self.bn.forward_t(&x, false)?;
        self.out.forward(&x)
    }
}
