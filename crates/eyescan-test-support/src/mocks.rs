//! Stand-in networks with known logits and input gradients.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use candle_core::{Device, Module, Tensor};
use eyescan_core::inference::{DecisionRule, Diagnoser, PINK_EYE_CLASSES, RETINOPATHY_CLASSES};

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    /// One logit: mean of the normalized input plus `bias`.
    Binary { bias: f32 },
    /// Two logits: `[mean, -mean]` plus `bias`.
    TwoClass { bias: [f32; 2] },
    /// Forward always errors.
    Failing,
}

/// Mock network for `Diagnoser` tests.
///
/// The logits are linear in the input, so the input gradient is uniform and
/// the saliency map is constant. Tracks forward calls for assertions.
#[derive(Debug, Clone)]
pub struct MockModel {
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
}

impl MockModel {
    /// Single-logit model; positive `bias` pushes towards class 1.
    #[must_use]
    pub fn binary(bias: f32) -> Self {
        Self::with(Behaviour::Binary { bias })
    }

    /// Two-logit model with per-class `bias`.
    #[must_use]
    pub fn two_class(bias: [f32; 2]) -> Self {
        Self::with(Behaviour::TwoClass { bias })
    }

    /// Model whose forward pass always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self::with(Behaviour::Failing)
    }

    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of forward passes so far, across clones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wraps a clone as a sigmoid-rule retinopathy diagnoser on the CPU.
    #[must_use]
    pub fn retinopathy(&self) -> Diagnoser {
        Diagnoser::new(
            Arc::new(self.clone()),
            DecisionRule::Sigmoid,
            RETINOPATHY_CLASSES,
            Device::Cpu,
        )
    }

    /// Wraps a clone as a softmax-rule pink-eye diagnoser on the CPU.
    #[must_use]
    pub fn pinkeye(&self) -> Diagnoser {
        Diagnoser::new(
            Arc::new(self.clone()),
            DecisionRule::Softmax,
            PINK_EYE_CLASSES,
            Device::Cpu,
        )
    }
}

impl Module for MockModel {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Binary { bias } => (xs.mean((1, 2, 3))?.unsqueeze(1)? + f64::from(bias)),
            Behaviour::TwoClass { bias } => {
                let mean = xs.mean((1, 2, 3))?.unsqueeze(1)?;
                let bias = Tensor::new(&[bias], xs.device())?;
                Tensor::cat(&[&mean, &mean.neg()?], 1)?.broadcast_add(&bias)
            }
            Behaviour::Failing => Err(candle_core::Error::Msg("mock forward failure".into())),
        }
    }
}
