//! In-process HTTP tests against the router with stand-in models.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use eyescan_core::{Diagnoser, LoadOutcome, ModelSlot};
use eyescan_server::{router, AppState};
use eyescan_test_support::{MockModel, SyntheticImageBuilder};
use serde_json::{json, Value};
use tower::ServiceExt;

const LIMIT: usize = 16 * 1024 * 1024;

fn slot(diagnoser: Option<Diagnoser>) -> ModelSlot<Diagnoser> {
    diagnoser.map_or_else(
        || ModelSlot::unavailable("missing 3 keys"),
        |d| ModelSlot::ready(d, LoadOutcome::Full),
    )
}

fn app(retinopathy: Option<Diagnoser>, pinkeye: Option<Diagnoser>) -> Router {
    router(Arc::new(AppState::new(slot(retinopathy), slot(pinkeye))), LIMIT)
}

fn loaded_app() -> Router {
    app(
        Some(MockModel::binary(0.0).retinopathy()),
        Some(MockModel::two_class([0.0, 0.0]).pinkeye()),
    )
}

fn red_pixel_body() -> String {
    json!({ "image": SyntheticImageBuilder::png_data_url(&SyntheticImageBuilder::red_pixel()) })
        .to_string()
}

async fn send(app: Router, method: Method, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
    send(app, Method::POST, uri, body).await
}

fn assert_error(status: StatusCode, body: &Value) {
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let error = body["error"].as_str().unwrap();
    assert!(!error.is_empty());
}

// === Health ===

#[tokio::test]
async fn test_health_without_models() {
    let (status, body) = send(app(None, None), Method::GET, "/api/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(
        body["models_loaded"],
        json!({ "retinopathy": false, "pinkeye": false })
    );
}

#[tokio::test]
async fn test_health_reports_each_model() {
    let app = app(Some(MockModel::binary(0.0).retinopathy()), None);
    let (_, body) = send(app, Method::GET, "/api/health", Body::empty()).await;
    assert_eq!(
        body["models_loaded"],
        json!({ "retinopathy": true, "pinkeye": false })
    );
}

#[tokio::test]
async fn test_connectivity_check_echoes_method() {
    let (status, body) = post(app(None, None), "/api/test", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Test successful", "method": "POST" }));
}

// === Predictions ===

#[tokio::test]
async fn test_retinopathy_red_pixel() {
    let (status, body) = post(loaded_app(), "/api/predict/retinopathy", red_pixel_body()).await;
    assert_eq!(status, StatusCode::OK);

    let label = body["prediction"].as_str().unwrap();
    assert!(["No Diabetic Retinopathy", "Diabetic Retinopathy Detected"].contains(&label));
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));

    let probs = body["all_probabilities"].as_object().unwrap();
    assert_eq!(probs.len(), 2);
    let total: f64 = probs.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((total - 1.0).abs() < 1e-5);
    assert!((probs[label].as_f64().unwrap() - confidence).abs() < 1e-6);
}

#[tokio::test]
async fn test_pinkeye_class_index_matches_larger_probability() {
    let app = app(None, Some(MockModel::two_class([-2.0, 2.0]).pinkeye()));
    let (status, body) = post(app, "/api/predict/pinkeye", red_pixel_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"], "Conjunctivitis Detected");
    assert_eq!(body["class_index"], 1);

    let normal = body["all_probabilities"]["Normal"].as_f64().unwrap();
    let detected = body["all_probabilities"]["Conjunctivitis Detected"].as_f64().unwrap();
    assert!(detected > normal);
    assert!((normal + detected - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_unloaded_models_report_error_for_any_payload() {
    for body in [red_pixel_body(), String::new(), "{not json".to_string()] {
        let (status, json) = post(app(None, None), "/api/predict/retinopathy", body.clone()).await;
        assert_error(status, &json);
        assert_eq!(json["error"], "Model not loaded");

        let (status, json) = post(app(None, None), "/api/predict/pinkeye", body.clone()).await;
        assert_error(status, &json);
        assert_eq!(json["error"], "Pink eye model not loaded");

        let (status, json) = post(app(None, None), "/api/shap/generate", body).await;
        assert_error(status, &json);
        assert_eq!(json["error"], "Model not loaded");
    }
}

#[tokio::test]
async fn test_unloaded_model_skips_inference() {
    let pinkeye = MockModel::two_class([0.0, 0.0]);
    let app = app(None, Some(pinkeye.pinkeye()));
    let (status, _) = post(app, "/api/predict/retinopathy", red_pixel_body()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(pinkeye.call_count(), 0);
}

#[tokio::test]
async fn test_empty_base64_is_error() {
    let body = json!({ "image": "data:image/png;base64," }).to_string();
    for uri in ["/api/predict/retinopathy", "/api/predict/pinkeye", "/api/shap/generate"] {
        let (status, json) = post(loaded_app(), uri, body.clone()).await;
        assert_error(status, &json);
    }
}

#[tokio::test]
async fn test_non_image_bytes_are_error() {
    let body = json!({ "image": format!("data:image/png;base64,{}", STANDARD.encode(b"plain text")) })
        .to_string();
    let (status, json) = post(loaded_app(), "/api/predict/retinopathy", body).await;
    assert_error(status, &json);
}

#[tokio::test]
async fn test_malformed_json_is_error() {
    for body in ["{not json", "{}", r#"{"image": 7}"#] {
        let (status, json) = post(loaded_app(), "/api/predict/pinkeye", body).await;
        assert_error(status, &json);
    }
}

#[tokio::test]
async fn test_inference_failure_is_error() {
    let app = app(Some(MockModel::failing().retinopathy()), None);
    let (status, json) = post(app, "/api/predict/retinopathy", red_pixel_body()).await;
    assert_error(status, &json);
    assert!(json["error"].as_str().unwrap().contains("mock forward failure"));
}

// === Saliency ===

#[tokio::test]
async fn test_shap_overlay_matches_input_dimensions() {
    let input = SyntheticImageBuilder::horizontal_gradient(37, 21);
    let body = json!({ "image": SyntheticImageBuilder::png_data_url(&input) }).to_string();

    let (status, json) = post(loaded_app(), "/api/shap/generate", body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["prediction"].is_string());
    assert!((0.0..=1.0).contains(&json["confidence"].as_f64().unwrap()));

    let url = json["shap_image"].as_str().unwrap();
    let payload = url.strip_prefix("data:image/png;base64,").unwrap();
    let overlay = image::load_from_memory(&STANDARD.decode(payload).unwrap()).unwrap();
    assert_eq!((overlay.width(), overlay.height()), (37, 21));
}

#[tokio::test]
async fn test_shap_matches_predict() {
    let model = MockModel::binary(0.3);
    let app = app(Some(model.retinopathy()), None);

    let (_, predicted) = post(app.clone(), "/api/predict/retinopathy", red_pixel_body()).await;
    let (_, explained) = post(app, "/api/shap/generate", red_pixel_body()).await;
    assert_eq!(predicted["prediction"], explained["prediction"]);
    let a = predicted["confidence"].as_f64().unwrap();
    let b = explained["confidence"].as_f64().unwrap();
    assert!((a - b).abs() < 1e-6);
}

// === CORS ===

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/health")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app(None, None).oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn test_cors_preflight() {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/predict/retinopathy")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app(None, None).oneshot(request).await.unwrap();
    assert!(response.status().is_success());
    let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
        .to_str()
        .unwrap()
        .to_string();
    assert!(methods.contains("POST"));
    assert!(methods.contains("DELETE"));
}
