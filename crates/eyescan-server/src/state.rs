//! Process-wide state, built once before the listener starts.

use candle_core::Device;
use eyescan_core::{Diagnoser, ModelSlot, ModelsLoaded, PinkEyeNet, RetinopathyNet};
use tracing::info;

use crate::cli::ServerSettings;

/// Both classifiers and how they loaded. Read-only after construction.
pub struct AppState {
    pub retinopathy: ModelSlot<Diagnoser>,
    pub pinkeye: ModelSlot<Diagnoser>,
}

impl AppState {
    #[must_use]
    pub const fn new(retinopathy: ModelSlot<Diagnoser>, pinkeye: ModelSlot<Diagnoser>) -> Self {
        Self {
            retinopathy,
            pinkeye,
        }
    }

    /// Loads both networks from the configured weight files.
    ///
    /// Load failures are logged and leave the corresponding slot unavailable.
    #[must_use]
    pub fn load(settings: &ServerSettings, device: &Device) -> Self {
        let retinopathy = ModelSlot::<RetinopathyNet>::load(&settings.retinopathy_weights, device)
            .map(|net| Diagnoser::retinopathy(net, device));
        let pinkeye = ModelSlot::<PinkEyeNet>::load(&settings.pinkeye_weights, device)
            .map(|net| Diagnoser::pinkeye(net, device));

        let state = Self::new(retinopathy, pinkeye);
        let status = state.models_loaded();
        info!(
            "Models loaded: retinopathy={} pinkeye={}",
            status.retinopathy, status.pinkeye
        );
        state
    }

    /// Per-model usability for the health endpoint.
    #[must_use]
    pub const fn models_loaded(&self) -> ModelsLoaded {
        ModelsLoaded {
            retinopathy: self.retinopathy.is_loaded(),
            pinkeye: self.pinkeye.is_loaded(),
        }
    }
}
