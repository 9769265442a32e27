//! Request-level failures and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use eyescan_core::DecodeError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

/// Everything a prediction endpoint can fail with. All map to HTTP 500.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The model did not load at startup.
    #[error("{0}")]
    ModelNotLoaded(&'static str),
    /// Body is not JSON or lacks a string `image` field.
    #[error("{0}")]
    Payload(String),
    /// The data URL or image bytes could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Forward pass, backward pass or rendering failed.
    #[error("{0:#}")]
    Inference(anyhow::Error),
    /// The blocking inference task panicked or was cancelled.
    #[error("inference task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Inference(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        warn!("Request failed: {message}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": message })),
        )
            .into_response()
    }
}
