//! Endpoint handlers.
//!
//! Bodies arrive as raw bytes and are parsed in the handler, after the model
//! availability check, so every failure takes the same `{error}` path.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::Json;
use eyescan_core::inference::{decode_data_url, encode_png_data_url};
use eyescan_core::{Diagnoser, ModelSlot, ModelsLoaded, Prediction};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::ApiError;
use crate::state::AppState;

const RETINOPATHY_NOT_LOADED: &str = "Model not loaded";
const PINKEYE_NOT_LOADED: &str = "Pink eye model not loaded";

/// Health endpoint payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests.
    pub status: &'static str,
    /// Fixed human-readable status line.
    pub message: &'static str,
    /// Which models may serve requests.
    pub models_loaded: ModelsLoaded,
}

/// Saliency endpoint payload.
#[derive(Debug, Serialize)]
pub struct ShapResponse {
    pub prediction: &'static str,
    pub confidence: f32,
    /// `data:image/png;base64,...` overlay at the input's dimensions.
    pub shap_image: String,
}

#[derive(Deserialize)]
struct ImageRequest {
    image: String,
}

/// `GET /api/health`: liveness plus per-model availability. Never fails.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        message: "Backend is running",
        models_loaded: state.models_loaded(),
    })
}

/// `GET|POST /api/test`: echoes the request method.
pub async fn test(method: Method) -> Json<Value> {
    debug!("Test endpoint hit ({method})");
    Json(json!({ "message": "Test successful", "method": method.as_str() }))
}

/// `POST /api/predict/retinopathy`: diabetic retinopathy classification.
///
/// # Errors
///
/// Fails with `{"error": ...}` and status 500 when the model is unavailable
/// (checked before the body is parsed), the payload is malformed, or
/// inference fails.
pub async fn predict_retinopathy(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Prediction>, ApiError> {
    let diagnoser = ready(&state.retinopathy, RETINOPATHY_NOT_LOADED)?;
    let prediction = run_blocking(move || Ok(diagnoser.predict(&parse_image(&body)?)?)).await?;
    info!(
        "Retinopathy: {} ({:.3})",
        prediction.label, prediction.confidence
    );
    Ok(Json(prediction))
}

/// `POST /api/predict/pinkeye`: conjunctivitis classification.
///
/// # Errors
///
/// Same as [`predict_retinopathy`], against the pink-eye model.
pub async fn predict_pinkeye(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Prediction>, ApiError> {
    let diagnoser = ready(&state.pinkeye, PINKEYE_NOT_LOADED)?;
    let prediction = run_blocking(move || Ok(diagnoser.predict(&parse_image(&body)?)?)).await?;
    info!("Pink eye: {} ({:.3})", prediction.label, prediction.confidence);
    Ok(Json(prediction))
}

/// `POST /api/shap/generate`: retinopathy prediction with a saliency overlay.
///
/// # Errors
///
/// Same as [`predict_retinopathy`], plus overlay rendering and encoding.
pub async fn shap_generate(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ShapResponse>, ApiError> {
    let diagnoser = ready(&state.retinopathy, RETINOPATHY_NOT_LOADED)?;
    let response = run_blocking(move || {
        let report = diagnoser.explain(&parse_image(&body)?)?;
        Ok(ShapResponse {
            prediction: report.prediction.label,
            confidence: report.prediction.confidence,
            shap_image: encode_png_data_url(&report.overlay)?,
        })
    })
    .await?;
    info!("Saliency: {} ({:.3})", response.prediction, response.confidence);
    Ok(Json(response))
}

/// Clones the diagnoser out of a usable slot.
fn ready(slot: &ModelSlot<Diagnoser>, message: &'static str) -> Result<Diagnoser, ApiError> {
    slot.get().cloned().ok_or(ApiError::ModelNotLoaded(message))
}

fn parse_image(body: &[u8]) -> Result<DynamicImage, ApiError> {
    let request: ImageRequest =
        serde_json::from_slice(body).map_err(|e| ApiError::Payload(e.to_string()))?;
    Ok(decode_data_url(&request.image)?)
}

/// Runs decoding and inference on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
