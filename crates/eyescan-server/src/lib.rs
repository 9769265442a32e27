//! Eyescan Server - HTTP façade over the eye-disease classifiers.
//!
//! The binary in `main.rs` wires these pieces together: CLI parsing, layered
//! configuration, one-time model loading into [`AppState`], and the axum
//! router from [`api::router`].

pub mod api;
pub mod cli;
pub mod config;
pub mod state;

pub use api::{router, ApiError};
pub use cli::{Cli, ServerSettings};
pub use config::AppConfig;
pub use state::AppState;
