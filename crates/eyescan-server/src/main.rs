//! Eyescan - HTTP inference server for eye-disease classifiers.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use eyescan_core::inference::describe_device;
use eyescan_core::get_device;
use eyescan_server::{router, AppConfig, AppState, Cli, ServerSettings};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = AppConfig::load();
    let settings = ServerSettings::resolve(&cli, &config);

    let device = get_device();
    info!("Using device: {}", describe_device(&device));
    let state = AppState::load(&settings, &device);

    if cli.check_models {
        let status = state.models_loaded();
        match serde_json::to_string(&status) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
        return if status.retinopathy && status.pinkeye {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(&settings, Arc::new(state))) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(settings: &ServerSettings, state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state, settings.body_limit))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
