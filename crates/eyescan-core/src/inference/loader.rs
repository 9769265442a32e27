//! Non-strict weight loading.
//!
//! Every parameter an architecture declares starts from candle's default
//! initialiser. Entries of the weight file whose key is declared overwrite it;
//! the rest of the file is ignored. The missing/unexpected key sets decide
//! whether the model may serve requests.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{VarBuilder, VarMap};
use tracing::{error, info};

use super::weights::read_state_dict;
use crate::domain::LoadOutcome;

/// Number of missing key names included in logs.
const MISSING_KEYS_LOGGED: usize = 5;

/// A network whose parameter tree matches an externally produced weight file.
pub trait Architecture: Module + Send + Sync + Sized {
    /// Display name used in logs.
    const NAME: &'static str;

    /// Builds the inference network from `vb`.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is missing or has the wrong shape.
    fn build(vb: VarBuilder) -> Result<Self>;

    /// Declares parameters the weight file carries but `forward` never reads.
    ///
    /// They count as expected keys during loading and are dropped afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a declaration conflicts with an existing parameter.
    fn declare_auxiliary(_vb: &VarBuilder) -> Result<()> {
        Ok(())
    }
}

/// Key-level comparison between an architecture and a weight file.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Number of parameters the architecture declares.
    pub declared: usize,
    /// Declared keys absent from the file, sorted.
    pub missing: Vec<String>,
    /// File keys the architecture does not declare, sorted.
    pub unexpected: Vec<String>,
}

impl LoadReport {
    /// Three-way classification of this report.
    #[must_use]
    pub fn outcome(&self) -> LoadOutcome {
        LoadOutcome::classify(self.missing.len(), self.unexpected.len())
    }
}

/// Loads `A` from a weight file without requiring an exact key match.
///
/// # Errors
///
/// Returns an error if:
/// - The weight file cannot be read
/// - A declared parameter has a different shape in the file
/// - The network cannot be rebuilt from the merged parameters
pub fn load_architecture<A: Architecture>(
    path: impl AsRef<Path>,
    device: &Device,
) -> Result<(A, LoadReport)> {
    let state = read_state_dict(path, device)?;
    load_from_state::<A>(&state, device)
}

/// Loads `A` from an in-memory state dict.
pub(crate) fn load_from_state<A: Architecture>(
    state: &HashMap<String, Tensor>,
    device: &Device,
) -> Result<(A, LoadReport)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    A::build(vb.clone()).with_context(|| format!("Failed to declare {} parameters", A::NAME))?;
    A::declare_auxiliary(&vb)
        .with_context(|| format!("Failed to declare {} auxiliary parameters", A::NAME))?;

    let report = overlay(&varmap, state)?;

    let frozen = freeze(&varmap)?;
    let model = A::build(VarBuilder::from_tensors(frozen, DType::F32, device))
        .with_context(|| format!("Failed to build {} model", A::NAME))?;

    Ok((model, report))
}

/// Copies matching file tensors into the declared variables.
fn overlay(varmap: &VarMap, state: &HashMap<String, Tensor>) -> Result<LoadReport> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;

    let mut missing = Vec::new();
    for (name, var) in vars.iter() {
        match state.get(name) {
            Some(tensor) => var.set(tensor).with_context(|| {
                format!(
                    "size mismatch for '{name}': declared {:?}, file has {:?}",
                    var.as_tensor().dims(),
                    tensor.dims()
                )
            })?,
            None => missing.push(name.clone()),
        }
    }

    let declared: HashSet<&String> = vars.keys().collect();
    let mut unexpected: Vec<String> = state
        .keys()
        .filter(|k| !declared.contains(k))
        .cloned()
        .collect();

    missing.sort();
    unexpected.sort();

    Ok(LoadReport {
        declared: vars.len(),
        missing,
        unexpected,
    })
}

/// Detaches every variable into a plain tensor so inference builds no graph.
fn freeze(varmap: &VarMap) -> Result<HashMap<String, Tensor>> {
    let vars = varmap
        .data()
        .lock()
        .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
    Ok(vars
        .iter()
        .map(|(name, var)| (name.clone(), var.as_tensor().detach()))
        .collect())
}

/// A model and its startup load outcome. Never changes after construction.
pub struct ModelSlot<T> {
    outcome: LoadOutcome,
    model: Option<T>,
}

impl<T> ModelSlot<T> {
    /// A slot holding a usable model.
    pub const fn ready(model: T, outcome: LoadOutcome) -> Self {
        Self {
            outcome,
            model: Some(model),
        }
    }

    /// A slot whose model failed to load.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            outcome: LoadOutcome::Failed {
                reason: reason.into(),
            },
            model: None,
        }
    }

    /// The model, when it loaded usably.
    pub const fn get(&self) -> Option<&T> {
        self.model.as_ref()
    }

    /// Returns true when the model may serve requests.
    pub const fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// How loading went.
    pub const fn outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    /// Wraps the loaded model, keeping the outcome.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ModelSlot<U> {
        ModelSlot {
            outcome: self.outcome,
            model: self.model.map(f),
        }
    }
}

impl<A: Architecture> ModelSlot<A> {
    /// Loads `A` from `path`, logging and classifying the result.
    ///
    /// Never fails: errors become an unavailable slot.
    pub fn load(path: impl AsRef<Path>, device: &Device) -> Self {
        let path = path.as_ref();
        info!("Loading {} model from {}", A::NAME, path.display());

        let (model, report) = match load_architecture::<A>(path, device) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!("{} model error: {e:#}", A::NAME);
                return Self::unavailable(format!("{e:#}"));
            }
        };

        let outcome = report.outcome();
        match &outcome {
            LoadOutcome::Full => {
                info!("{} model loaded ({} tensors)", A::NAME, report.declared);
            }
            LoadOutcome::Partial { unexpected } => {
                info!(
                    "{} model loaded ({unexpected} extra keys ignored)",
                    A::NAME
                );
            }
            LoadOutcome::Failed { .. } => {
                error!(
                    "{} model failed - missing {} keys",
                    A::NAME,
                    report.missing.len()
                );
                error!(
                    "First few missing: {:?}",
                    &report.missing[..report.missing.len().min(MISSING_KEYS_LOGGED)]
                );
                return Self {
                    outcome,
                    model: None,
                };
            }
        }

        Self::ready(model, outcome)
    }
}
