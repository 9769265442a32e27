//! Command-line arguments and their merge with file configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// Hardcoded defaults, lowest configuration layer.
pub mod defaults {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    pub const BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5005);
    pub const MODELS_DIR: &str = "models";
    pub const RETINOPATHY_WEIGHTS: &str = "retinopathy_model.pth";
    pub const PINKEYE_WEIGHTS: &str = "pinkeye_model.pth";
    pub const BODY_LIMIT: usize = 16 * 1024 * 1024;
}

/// Parse a request body limit in bytes (must be positive).
fn parse_body_limit(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid byte count"))?;
    if value == 0 {
        return Err("body limit must be positive".to_string());
    }
    Ok(value)
}

/// Eyescan - diabetic retinopathy and conjunctivitis inference server
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "eyescan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Address to listen on [default: 0.0.0.0:5005]
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,

    /// Directory holding the weight files [default: models]
    #[arg(long, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    /// Retinopathy weight file (relative paths are taken from the working directory)
    #[arg(long, value_name = "FILE")]
    pub retinopathy_weights: Option<PathBuf>,

    /// Pink-eye weight file (relative paths are taken from the working directory)
    #[arg(long, value_name = "FILE")]
    pub pinkeye_weights: Option<PathBuf>,

    /// Maximum request body size in bytes [default: 16 MiB]
    #[arg(long, value_name = "BYTES", value_parser = parse_body_limit)]
    pub body_limit: Option<usize>,

    /// Load both models, print their status as JSON and exit
    #[arg(long)]
    pub check_models: bool,
}

/// Fully resolved server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub body_limit: usize,
    pub retinopathy_weights: PathBuf,
    pub pinkeye_weights: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::resolve(&Cli::default(), &AppConfig::default())
    }
}

impl ServerSettings {
    /// Layers CLI flags over file configuration over hardcoded defaults.
    ///
    /// Weight files named in configuration resolve against the models dir;
    /// weight files given on the command line are used as given.
    #[must_use]
    pub fn resolve(cli: &Cli, config: &AppConfig) -> Self {
        let bind = cli
            .bind
            .or_else(|| config.server.bind.as_deref().and_then(|b| b.parse().ok()))
            .unwrap_or(defaults::BIND);

        let body_limit = cli
            .body_limit
            .or(config.server.body_limit.filter(|&n| n > 0))
            .unwrap_or(defaults::BODY_LIMIT);

        let models_dir = cli
            .models_dir
            .clone()
            .or_else(|| config.models.dir.clone())
            .unwrap_or_else(|| PathBuf::from(defaults::MODELS_DIR));

        let weights = |flag: &Option<PathBuf>, configured: &Option<PathBuf>, default: &str| {
            flag.clone().unwrap_or_else(|| {
                models_dir.join(configured.clone().unwrap_or_else(|| PathBuf::from(default)))
            })
        };

        Self {
            bind,
            body_limit,
            retinopathy_weights: weights(
                &cli.retinopathy_weights,
                &config.models.retinopathy,
                defaults::RETINOPATHY_WEIGHTS,
            ),
            pinkeye_weights: weights(
                &cli.pinkeye_weights,
                &config.models.pinkeye,
                defaults::PINKEYE_WEIGHTS,
            ),
        }
    }
}
