//! `EfficientNet` backbone.
//!
//! Implements the mobile inverted-bottleneck network from "`EfficientNet`: Rethinking
//! Model Scaling for Convolutional Neural Networks". The same blocks are built under
//! two parameter naming schemes so checkpoints exported from torchvision and from
//! timm load key-for-key:
//!
//! - torchvision: `features.{stage}.{block}.block.{layer}...`
//! - timm: `conv_stem`, `blocks.{stage}.{block}.conv_dw`, `conv_head`, ...

// Allow common ML code patterns
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

use anyhow::Result;
use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{batch_norm, conv2d, conv2d_no_bias, BatchNorm, Conv2d, Conv2dConfig, VarBuilder};

use super::sigmoid_tensor;

/// `BatchNorm` epsilon used by both torchvision and timm for `EfficientNet` v1.
const BN_EPS: f64 = 1e-5;

/// Stem output width before scaling.
const STEM_CHANNELS: usize = 32;

/// Channel counts are rounded to a multiple of this.
const CHANNEL_DIVISOR: usize = 8;

/// Head width is this multiple of the last stage width.
const HEAD_EXPANSION: usize = 4;

/// One stage of the B0 baseline.
struct StageConfig {
    expand: usize,
    kernel: usize,
    stride: usize,
    out_channels: usize,
    layers: usize,
}

/// B0 baseline stages; other variants scale widths and depths from here.
const BASE_STAGES: [StageConfig; 7] = [
    StageConfig { expand: 1, kernel: 3, stride: 1, out_channels: 16, layers: 1 },
    StageConfig { expand: 6, kernel: 3, stride: 2, out_channels: 24, layers: 2 },
    StageConfig { expand: 6, kernel: 5, stride: 2, out_channels: 40, layers: 2 },
    StageConfig { expand: 6, kernel: 3, stride: 2, out_channels: 80, layers: 3 },
    StageConfig { expand: 6, kernel: 5, stride: 1, out_channels: 112, layers: 3 },
    StageConfig { expand: 6, kernel: 5, stride: 2, out_channels: 192, layers: 4 },
    StageConfig { expand: 6, kernel: 3, stride: 1, out_channels: 320, layers: 1 },
];

/// Parameter naming scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `torchvision.models.efficientnet_*`.
    Torchvision,
    /// `timm.create_model("efficientnet_*")`.
    Timm,
}

/// Compound-scaling variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Width 1.0, depth 1.0 (1280 output features).
    B0,
    /// Width 1.4, depth 1.8 (1792 output features).
    B4,
}

impl Variant {
    const fn width(self) -> f64 {
        match self {
            Self::B0 => 1.0,
            Self::B4 => 1.4,
        }
    }

    const fn depth(self) -> f64 {
        match self {
            Self::B0 => 1.0,
            Self::B4 => 1.8,
        }
    }

    /// Width of the pooled feature vector.
    #[must_use]
    pub fn out_channels(self) -> usize {
        let last = BASE_STAGES[BASE_STAGES.len() - 1].out_channels;
        HEAD_EXPANSION * scale_channels(last, self.width())
    }
}

/// Scales a channel count, rounding to the nearest multiple of 8 without
/// dropping more than 10% below the unrounded value.
#[must_use]
pub fn scale_channels(channels: usize, width: f64) -> usize {
    let value = channels as f64 * width;
    let divisor = CHANNEL_DIVISOR as f64;
    let rounded = ((value + divisor / 2.0) / divisor).floor() * divisor;
    let rounded = rounded.max(divisor);
    if rounded < 0.9 * value {
        (rounded + divisor) as usize
    } else {
        rounded as usize
    }
}

/// Scales a stage's layer count, rounding up.
#[must_use]
pub fn scale_depth(layers: usize, depth: f64) -> usize {
    (layers as f64 * depth).ceil() as usize
}

#[derive(Debug, Clone, Copy)]
struct ConvSpec {
    in_channels: usize,
    out_channels: usize,
    kernel: usize,
    stride: usize,
    groups: usize,
    activation: bool,
}

impl ConvSpec {
    const fn pointwise(in_channels: usize, out_channels: usize, activation: bool) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel: 1,
            stride: 1,
            groups: 1,
            activation,
        }
    }

    const fn depthwise(channels: usize, kernel: usize, stride: usize) -> Self {
        Self {
            in_channels: channels,
            out_channels: channels,
            kernel,
            stride,
            groups: channels,
            activation: true,
        }
    }
}

/// Bias-free convolution, `BatchNorm`, optional `SiLU`.
struct ConvNorm {
    conv: Conv2d,
    norm: BatchNorm,
    activation: bool,
}

impl ConvNorm {
    #[allow(clippy::needless_pass_by_value)]
    fn new(spec: ConvSpec, conv_vb: VarBuilder, norm_vb: VarBuilder) -> Result<Self> {
        let conv = conv2d_no_bias(
            spec.in_channels,
            spec.out_channels,
            spec.kernel,
            Conv2dConfig {
                padding: (spec.kernel - 1) / 2,
                stride: spec.stride,
                groups: spec.groups,
                ..Conv2dConfig::default()
            },
            conv_vb,
        )?;
        let norm = batch_norm(spec.out_channels, BN_EPS, norm_vb)?;

        Ok(Self {
            conv,
            norm,
            activation: spec.activation,
        })
    }
}

impl Module for ConvNorm {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = self.conv.forward(x)?;
        let x = self.norm.forward_t(&x, false)?;
        if self.activation {
            x.silu()
        } else {
            Ok(x)
        }
    }
}

/// Channel attention: pool, reduce, `SiLU`, expand, sigmoid gate.
struct SqueezeExcite {
    reduce: Conv2d,
    expand: Conv2d,
}

impl SqueezeExcite {
    #[allow(clippy::needless_pass_by_value)]
    fn new(
        channels: usize,
        squeezed: usize,
        reduce_vb: VarBuilder,
        expand_vb: VarBuilder,
    ) -> Result<Self> {
        let reduce = conv2d(channels, squeezed, 1, Conv2dConfig::default(), reduce_vb)?;
        let expand = conv2d(squeezed, channels, 1, Conv2dConfig::default(), expand_vb)?;
        Ok(Self { reduce, expand })
    }
}

impl Module for SqueezeExcite {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let scale = x.mean_keepdim((2, 3))?;
        let scale = self.reduce.forward(&scale)?.silu()?;
        let scale = self.expand.forward(&scale)?;
        x.broadcast_mul(&sigmoid_tensor(&scale)?)
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockConfig {
    in_channels: usize,
    out_channels: usize,
    expand: usize,
    kernel: usize,
    stride: usize,
}

impl BlockConfig {
    const fn expanded(&self) -> usize {
        self.in_channels * self.expand
    }

    /// Squeeze width is a quarter of the block input, not the expanded width.
    const fn squeezed(&self) -> usize {
        let s = self.in_channels / 4;
        if s == 0 {
            1
        } else {
            s
        }
    }

    const fn has_residual(&self) -> bool {
        self.stride == 1 && self.in_channels == self.out_channels
    }
}

/// Mobile inverted bottleneck block.
struct MbConv {
    expand: Option<ConvNorm>,
    depthwise: ConvNorm,
    se: SqueezeExcite,
    project: ConvNorm,
    residual: bool,
}

impl MbConv {
    /// torchvision: a `block` sequential whose indices shift when there is no expansion.
    fn torchvision(cfg: BlockConfig, vb: &VarBuilder) -> Result<Self> {
        let vb = vb.pp("block");
        let mut index = 0;

        let expand = if cfg.expand == 1 {
            None
        } else {
            index += 1;
            Some(ConvNorm::new(
                ConvSpec::pointwise(cfg.in_channels, cfg.expanded(), true),
                vb.pp("0.0"),
                vb.pp("0.1"),
            )?)
        };

        let depthwise = ConvNorm::new(
            ConvSpec::depthwise(cfg.expanded(), cfg.kernel, cfg.stride),
            vb.pp(format!("{index}.0")),
            vb.pp(format!("{index}.1")),
        )?;
        index += 1;

        let se_vb = vb.pp(index.to_string());
        let se = SqueezeExcite::new(
            cfg.expanded(),
            cfg.squeezed(),
            se_vb.pp("fc1"),
            se_vb.pp("fc2"),
        )?;
        index += 1;

        let project = ConvNorm::new(
            ConvSpec::pointwise(cfg.expanded(), cfg.out_channels, false),
            vb.pp(format!("{index}.0")),
            vb.pp(format!("{index}.1")),
        )?;

        Ok(Self {
            expand,
            depthwise,
            se,
            project,
            residual: cfg.has_residual(),
        })
    }

    /// timm: `DepthwiseSeparableConv` without expansion, `InvertedResidual` otherwise.
    fn timm(cfg: BlockConfig, vb: &VarBuilder) -> Result<Self> {
        let dw_spec = ConvSpec::depthwise(cfg.expanded(), cfg.kernel, cfg.stride);
        let pw_spec = ConvSpec::pointwise(cfg.expanded(), cfg.out_channels, false);
        let se = SqueezeExcite::new(
            cfg.expanded(),
            cfg.squeezed(),
            vb.pp("se.conv_reduce"),
            vb.pp("se.conv_expand"),
        )?;

        let (expand, depthwise, project) = if cfg.expand == 1 {
            (
                None,
                ConvNorm::new(dw_spec, vb.pp("conv_dw"), vb.pp("bn1"))?,
                ConvNorm::new(pw_spec, vb.pp("conv_pw"), vb.pp("bn2"))?,
            )
        } else {
            (
                Some(ConvNorm::new(
                    ConvSpec::pointwise(cfg.in_channels, cfg.expanded(), true),
                    vb.pp("conv_pw"),
                    vb.pp("bn1"),
                )?),
                ConvNorm::new(dw_spec, vb.pp("conv_dw"), vb.pp("bn2"))?,
                ConvNorm::new(pw_spec, vb.pp("conv_pwl"), vb.pp("bn3"))?,
            )
        };

        Ok(Self {
            expand,
            depthwise,
            se,
            project,
            residual: cfg.has_residual(),
        })
    }
}

impl Module for MbConv {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let h = match &self.expand {
            Some(expand) => expand.forward(x)?,
            None => x.clone(),
        };
        let h = self.depthwise.forward(&h)?;
        let h = self.se.forward(&h)?;
        let h = self.project.forward(&h)?;
        if self.residual {
            h + x
        } else {
            Ok(h)
        }
    }
}

/// `EfficientNet` feature extractor.
///
/// `forward` returns the globally average-pooled feature vector of shape
/// `(batch, out_channels)`; classifier heads live in the owning network.
pub struct EfficientNet {
    stem: ConvNorm,
    blocks: Vec<MbConv>,
    head: ConvNorm,
    out_channels: usize,
}

impl EfficientNet {
    /// Builds the backbone, reading parameters under `vb` with the given layout.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing or has the wrong shape.
    pub fn new(vb: &VarBuilder, layout: Layout, variant: Variant) -> Result<Self> {
        let width = variant.width();
        let depth = variant.depth();

        let stem_channels = scale_channels(STEM_CHANNELS, width);
        let stem_spec = ConvSpec {
            in_channels: 3,
            out_channels: stem_channels,
            kernel: 3,
            stride: 2,
            groups: 1,
            activation: true,
        };
        let stem = match layout {
            Layout::Torchvision => {
                ConvNorm::new(stem_spec, vb.pp("features.0.0"), vb.pp("features.0.1"))?
            }
            Layout::Timm => ConvNorm::new(stem_spec, vb.pp("conv_stem"), vb.pp("bn1"))?,
        };

        let mut blocks = Vec::new();
        let mut in_channels = stem_channels;
        for (stage_index, stage) in BASE_STAGES.iter().enumerate() {
            let out_channels = scale_channels(stage.out_channels, width);
            for layer in 0..scale_depth(stage.layers, depth) {
                let cfg = BlockConfig {
                    in_channels,
                    out_channels,
                    expand: stage.expand,
                    kernel: stage.kernel,
                    stride: if layer == 0 { stage.stride } else { 1 },
                };
                let block = match layout {
                    Layout::Torchvision => MbConv::torchvision(
                        cfg,
                        &vb.pp(format!("features.{}.{layer}", stage_index + 1)),
                    )?,
                    Layout::Timm => {
                        MbConv::timm(cfg, &vb.pp(format!("blocks.{stage_index}.{layer}")))?
                    }
                };
                blocks.push(block);
                in_channels = out_channels;
            }
        }

        let out_channels = HEAD_EXPANSION * in_channels;
        let head_spec = ConvSpec::pointwise(in_channels, out_channels, true);
        let head = match layout {
            Layout::Torchvision => {
                let head_vb = vb.pp(format!("features.{}", BASE_STAGES.len() + 1));
                ConvNorm::new(head_spec, head_vb.pp("0"), head_vb.pp("1"))?
            }
            Layout::Timm => ConvNorm::new(head_spec, vb.pp("conv_head"), vb.pp("bn2"))?,
        };

        Ok(Self {
            stem,
            blocks,
            head,
            out_channels,
        })
    }

    /// Width of the pooled feature vector.
    #[must_use]
    pub const fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Runs the convolutional trunk, returning the feature map before pooling.
    ///
    /// # Errors
    ///
    /// Returns an error if a tensor op fails.
    pub fn forward_features(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let mut h = self.stem.forward(x)?;
        for block in &self.blocks {
            h = block.forward(&h)?;
        }
        self.head.forward(&h)
    }
}

impl Module for EfficientNet {
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        self.forward_features(x)?.mean((2, 3))
    }
}
