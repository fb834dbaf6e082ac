//! Service Configuration
//!
//! Settings stored in TOML format. Values resolve as defaults, then the config
//! file, then command-line overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings
    pub server: ServerSettings,
    /// Recognition engine settings
    pub engine: EngineSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5001,
            // Full-screen captures as base64 easily exceed axum's 2 MiB default
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// `host:port` string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Recognition engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Language codes to recognize (must share one script)
    pub languages: Vec<String>,
    /// Run inference on a GPU execution provider
    pub use_gpu: bool,
    /// Model cache directory (platform data dir when unset)
    pub models_dir: Option<PathBuf>,
    /// Never download models; fail if they are missing
    pub offline: bool,
    /// Longest image side fed to the detection model
    pub det_limit_side_len: u32,
    /// Probability threshold for the detection bitmap
    pub det_threshold: f32,
    /// Minimum mean probability for a detected box
    pub box_threshold: f32,
    /// Box expansion ratio applied after detection
    pub unclip_ratio: f32,
    /// Minimum mean confidence for a recognized fragment
    pub recognition_threshold: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            use_gpu: false,
            models_dir: None,
            offline: false,
            det_limit_side_len: 960,
            det_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            recognition_threshold: 0.5,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<ServiceConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: ServiceConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &ServiceConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
