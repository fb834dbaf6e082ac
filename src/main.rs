//! QuikSnap OCR - base64 image in, recognized text out
//!
//! Loads the PaddleOCR engine once, then serves `POST /ocr` and `GET /health`.
//! The listener is only bound after the engine is ready.

mod config;
mod server;
mod storage;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::ServiceConfig;
use crate::server::AppState;

/// QuikSnap OCR service
#[derive(Parser, Debug)]
#[command(name = "quiksnap-ocr")]
#[command(about = "HTTP service that extracts text from base64-encoded images")]
#[command(version)]
struct Args {
    /// Config file (defaults to config.toml in the platform config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(short, long)]
    port: Option<u16>,

    /// Recognition language code; repeat for several (e.g. --lang en --lang fr)
    #[arg(short, long = "lang")]
    languages: Vec<String>,

    /// Run inference on the GPU (fails at startup if unavailable)
    #[arg(long)]
    gpu: bool,

    /// Directory holding cached models
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Never download models
    #[arg(long)]
    offline: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

impl Args {
    /// Command-line values override whatever the config file says
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if !self.languages.is_empty() {
            config.engine.languages = self.languages.clone();
        }
        if self.gpu {
            config.engine.use_gpu = true;
        }
        if let Some(dir) = &self.models_dir {
            config.engine.models_dir = Some(dir.clone());
        }
        if self.offline {
            config.engine.offline = true;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_or_create_config(args.config.as_deref())?;
    args.apply(&mut config);

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }
    if let Some(path) = &args.write_config {
        config::save_config(&config, path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    init_logging(&config.logging.level)?;

    info!("QuikSnap OCR starting...");

    // Fatal on failure: nothing is bound until the engine is loaded
    let engine = vision::initialize(&config.engine).context("Failed to initialize OCR engine")?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(async {
        let listener = TcpListener::bind(config.server.bind_addr())
            .await
            .with_context(|| format!("Failed to bind {}", config.server.bind_addr()))?;
        let app = server::build_router(AppState { engine }, config.server.max_body_bytes);
        server::serve(listener, app).await
    })
}

/// Initialize logging; `RUST_LOG` takes precedence over the configured level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Load configuration from an explicit path, the default location, or defaults
fn load_or_create_config(explicit: Option<&Path>) -> Result<ServiceConfig> {
    if let Some(path) = explicit {
        return config::load_config(path);
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            return config::load_config(&config_path);
        }
    }

    Ok(ServiceConfig::default())
}
