//! Vision/OCR Layer
//!
//! Owns the recognition engine. It is built once at startup by [`initialize`]
//! and shared read-only by every request afterwards.

pub mod decode;
pub mod detection;
pub mod frame;
pub mod language;
pub mod models;
pub mod ocr;
pub mod preprocess;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::config::EngineSettings;

pub use frame::PixelBuffer;
pub use language::resolve_script;
pub use models::ModelManager;
pub use ocr::OcrEngine;

/// Text recognition capability shared by all request handlers.
///
/// Implementations must tolerate concurrent calls through `&self`.
pub trait Recognizer: Send + Sync {
    /// Recognize text in `pixels`.
    ///
    /// Returns one string per detected text region in engine order. The
    /// order follows the engine's box sorting and is not a layout guarantee.
    fn recognize(&self, pixels: &PixelBuffer) -> Result<Vec<String>>;
}

/// Shared handle to the process-wide engine
pub type EngineHandle = Arc<dyn Recognizer>;

/// Load the recognition engine for the configured languages.
///
/// Resolves the language set to one script, makes sure the models are cached
/// (downloading unless offline) and creates the ONNX sessions. Any failure is
/// returned to the caller, which must not start serving.
pub fn initialize(settings: &EngineSettings) -> Result<EngineHandle> {
    let start = Instant::now();

    let script = resolve_script(&settings.languages)?;
    info!(
        "Initializing OCR engine: languages={:?}, script={:?}, gpu={}",
        settings.languages, script, settings.use_gpu
    );

    let models_dir = match &settings.models_dir {
        Some(dir) => dir.clone(),
        None => crate::storage::default_models_dir()?,
    };
    let manager = ModelManager::with_dir(models_dir, settings.offline)?;
    let paths = manager
        .ensure_models(script)
        .with_context(|| format!("Models unavailable in {}", manager.models_dir().display()))?;

    let engine = OcrEngine::new(&paths, settings)?;
    info!("OCR engine initialized in {:?}", start.elapsed());

    Ok(Arc::new(engine))
}
