//! Model load status, fixed at startup.

use serde::Serialize;

/// How a weight file matched its architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Every declared parameter was loaded and the file held nothing else.
    Full,
    /// Every declared parameter was loaded; extra file entries were ignored.
    Partial {
        /// Number of file entries the architecture does not declare.
        unexpected: usize,
    },
    /// The model cannot serve requests.
    Failed {
        /// Why loading failed.
        reason: String,
    },
}

impl LoadOutcome {
    /// Classifies a load from its missing and unexpected key counts.
    #[must_use]
    pub fn classify(missing: usize, unexpected: usize) -> Self {
        match (missing, unexpected) {
            (0, 0) => Self::Full,
            (0, unexpected) => Self::Partial { unexpected },
            (missing, _) => Self::Failed {
                reason: format!("missing {missing} keys"),
            },
        }
    }

    /// Returns true when the model may be used for inference.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Full | Self::Partial { .. })
    }
}

/// Per-model availability as reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelsLoaded {
    /// Retinopathy classifier is usable.
    pub retinopathy: bool,
    /// Pink-eye classifier is usable.
    pub pinkeye: bool,
}
