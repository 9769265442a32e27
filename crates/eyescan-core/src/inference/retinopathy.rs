//! Diabetic retinopathy classifier.
//!
//! torchvision `EfficientNet`-B4 features followed by a three-layer
//! fully-connected head producing a single logit. The exported checkpoints also
//! carry a complete second B4 (`backbone.*`, including its 1000-way ImageNet
//! classifier) that the forward pass never touches; it is declared as auxiliary
//! so those keys count as expected.

use anyhow::Result;
use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{batch_norm, linear, linear_no_bias, BatchNorm, Linear, VarBuilder};

use super::efficientnet::{EfficientNet, Layout, Variant};
use super::loader::Architecture;

/// Classes of the ImageNet classifier carried by the auxiliary backbone.
const IMAGENET_CLASSES: usize = 1000;

const BN_EPS: f64 = 1e-5;

/// Retinopathy network. Output shape `(batch, 1)`.
pub struct RetinopathyNet {
    features: EfficientNet,
    fc1: Linear,
    bn1: BatchNorm,
    fc2: Linear,
    bn2: BatchNorm,
    out: Linear,
}

impl Architecture for RetinopathyNet {
    const NAME: &'static str = "Retinopathy";

    fn build(vb: VarBuilder) -> Result<Self> {
        // trunk keys sit at the root: features.*
        let features = EfficientNet::new(&vb, Layout::Torchvision, Variant::B4)?;
        let width = features.out_channels();

        // classifier: Dropout(0.4), Linear, BN, SiLU, Dropout(0.3), Linear, BN, SiLU, Dropout(0.2), Linear
        let head = vb.pp("classifier");
        let fc1 = linear(width, 1024, head.pp("1"))?;
        let bn1 = batch_norm(1024, BN_EPS, head.pp("2"))?;
        let fc2 = linear(1024, 512, head.pp("5"))?;
        let bn2 = batch_norm(512, BN_EPS, head.pp("6"))?;
        let out = linear_no_bias(512, 1, head.pp("9"))?;

        Ok(Self {
            features,
            fc1,
            bn1,
            fc2,
            bn2,
            out,
        })
    }

    fn declare_auxiliary(vb: &VarBuilder) -> Result<()> {
        let backbone = vb.pp("backbone");
        let trunk = EfficientNet::new(&backbone, Layout::Torchvision, Variant::B4)?;
        linear(
            trunk.out_channels(),
            IMAGENET_CLASSES,
            backbone.pp("classifier.1"),
        )?;
        Ok(())
    }
}

impl Module for RetinopathyNet {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.features.forward(x)?;

        let x = self.fc1.forward(&x)?;
        let x = self.bn1.forward_t(&x, false)?.silu()?;

        let x = self.fc2.forward(&x)?;
        let x = self.bn2.forward_t(&x, false)?.silu()?;

        self.out.forward(&x)
    }
}
