//! Configuration file support for eyescan.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/eyescan/config.toml` (lowest priority)
//! - Project-local: `.eyescan.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied in [`crate::cli::ServerSettings::resolve`])

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

/// Name of the project-local config file.
pub const PROJECT_CONFIG_FILE: &str = ".eyescan.toml";

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Weight file locations.
    pub models: ModelsConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:5005`.
    pub bind: Option<String>,
    /// Maximum request body size in bytes.
    pub body_limit: Option<usize>,
}

/// Model configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding the weight files.
    pub dir: Option<PathBuf>,
    /// Retinopathy weight file, relative to `dir` unless absolute.
    pub retinopathy: Option<PathBuf>,
    /// Pink-eye weight file, relative to `dir` unless absolute.
    pub pinkeye: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Priority (lowest to highest):
    /// 1. XDG config: `~/.config/eyescan/config.toml`
    /// 2. Project-local: `.eyescan.toml` (searched up from cwd)
    ///
    /// Missing files are silently ignored. Invalid values are logged as warnings.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        for problem in config.validate() {
            warn!("{problem}; falling back to the default");
        }

        config
    }

    /// Lists every configured value that cannot be used. Empty when all are valid.
    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(ref bind) = self.server.bind {
            if bind.parse::<SocketAddr>().is_err() {
                problems.push(format!("server.bind must be a socket address, got '{bind}'"));
            }
        }
        if self.server.body_limit == Some(0) {
            problems.push("server.body_limit must be positive".to_string());
        }
        problems
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        // Server
        self.server.bind = other.server.bind.or_else(|| self.server.bind.take());
        self.server.body_limit = other.server.body_limit.or(self.server.body_limit);

        // Models
        self.models.dir = other.models.dir.or_else(|| self.models.dir.take());
        self.models.retinopathy = other
            .models
            .retinopathy
            .or_else(|| self.models.retinopathy.take());
        self.models.pinkeye = other.models.pinkeye.or_else(|| self.models.pinkeye.take());
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("eyescan").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.eyescan.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    None
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}
