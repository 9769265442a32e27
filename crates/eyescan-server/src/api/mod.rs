//! HTTP routes under `/api`.

mod error;
mod handlers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::{HealthResponse, ShapResponse};

use crate::state::AppState;

/// Builds the application router with CORS, request tracing and a body limit.
pub fn router(state: Arc<AppState>, body_limit: usize) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/test", get(handlers::test).post(handlers::test))
        .route("/predict/retinopathy", post(handlers::predict_retinopathy))
        .route("/predict/pinkeye", post(handlers::predict_pinkeye))
        .route("/shap/generate", post(handlers::shap_generate))
        .layer(cors());

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open to every origin.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::PUT,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
