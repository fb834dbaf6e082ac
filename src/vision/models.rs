//! Model management for ONNX Runtime
//!
//! Handles downloading, caching, and loading of PaddleOCR models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ndarray::{ArrayD, ArrayView4, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::language::Script;

const MODEL_REPO: &str = "https://huggingface.co/monkt/paddleocr-onnx/resolve/main";

/// Environment variable that forbids model downloads
pub const OFFLINE_ENV: &str = "QUIKSNAP_OCR_OFFLINE";

/// Model identifier for PaddleOCR components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Text detection model (DBNet), shared by all scripts
    Detection,
    /// Text recognition model for one script
    Recognition(Script),
    /// Character dictionary matching the recognition model
    Dictionary(Script),
}

impl ModelType {
    /// Get the filename for this model type
    pub fn filename(&self) -> String {
        match self {
            ModelType::Detection => "det.onnx".to_string(),
            ModelType::Recognition(script) => format!("rec_{}.onnx", script.dir_name()),
            ModelType::Dictionary(script) => format!("dict_{}.txt", script.dir_name()),
        }
    }

    /// Get the download URL for this model
    pub fn download_url(&self) -> String {
        match self {
            ModelType::Detection => format!("{MODEL_REPO}/detection/v3/det.onnx"),
            ModelType::Recognition(script) => {
                format!("{MODEL_REPO}/languages/{}/rec.onnx", script.dir_name())
            }
            ModelType::Dictionary(script) => {
                format!("{MODEL_REPO}/languages/{}/dict.txt", script.dir_name())
            }
        }
    }

    /// Plausible file size range, used to reject truncated downloads
    pub fn expected_size_range(&self) -> (u64, u64) {
        match self {
            ModelType::Detection => (1_000_000, 10_000_000),      // ~2.4 MB
            ModelType::Recognition(_) => (1_000_000, 200_000_000), // 7 MB latin, more for CJK
            ModelType::Dictionary(_) => (100, 2_000_000),
        }
    }

    /// Display name for progress reporting
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::Detection => "Text Detection",
            ModelType::Recognition(_) => "Text Recognition",
            ModelType::Dictionary(_) => "Character Dictionary",
        }
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: String,
    /// Unix timestamp (seconds)
    pub downloaded_at: u64,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            models: Vec::new(),
        }
    }
}

/// Resolved on-disk locations of everything one engine needs
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
    pub dictionary: PathBuf,
}

/// Model manager for downloading and caching ONNX models
pub struct ModelManager {
    models_dir: PathBuf,
    offline: bool,
}

impl ModelManager {
    /// Create model manager with custom directory
    pub fn with_dir(models_dir: PathBuf, offline: bool) -> Result<Self> {
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create models directory {}", models_dir.display()))?;
        let offline = offline || std::env::var_os(OFFLINE_ENV).is_some();
        Ok(Self { models_dir, offline })
    }

    /// Get the models directory path
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    /// Get the path to a specific model file
    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        self.models_dir.join(model_type.filename())
    }

    /// Check if a model is already downloaded
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        let Ok(metadata) = std::fs::metadata(self.model_path(model_type)) else {
            return false;
        };

        let (min, max) = model_type.expected_size_range();
        let size = metadata.len();
        size >= min && size <= max
    }

    /// Make sure detection, recognition and dictionary files for `script` are present
    pub fn ensure_models(&self, script: Script) -> Result<ModelPaths> {
        Ok(ModelPaths {
            detection: self.ensure_model(ModelType::Detection)?,
            recognition: self.ensure_model(ModelType::Recognition(script))?,
            dictionary: self.ensure_model(ModelType::Dictionary(script))?,
        })
    }

    /// Download a model if not already available
    /// Returns the path to the model file
    pub fn ensure_model(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model_type);

        if self.is_model_available(model_type) {
            debug!("Model {:?} already available at {:?}", model_type, path);
            return Ok(path);
        }

        if self.offline {
            anyhow::bail!(
                "Offline mode: {} model missing. Download it from {} and place it at {}",
                model_type.display_name(),
                model_type.download_url(),
                path.display()
            );
        }

        self.download_model(model_type)?;
        Ok(path)
    }

    /// Download a specific model (blocking)
    fn download_model(&self, model_type: ModelType) -> Result<()> {
        let url = model_type.download_url();
        let path = self.model_path(model_type);

        info!("Downloading {} model from {}", model_type.display_name(), url);

        // Startup runs before the server runtime exists, so a private one is fine here
        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let hash = rt.block_on(download_file(&url, &path))?;

        if !self.is_model_available(model_type) {
            anyhow::bail!(
                "Downloaded {} has an unexpected size",
                model_type.filename()
            );
        }

        self.update_manifest_for_model(model_type, hash)?;

        info!("Successfully downloaded {} model", model_type.display_name());
        Ok(())
    }

    /// Update manifest after successful download
    fn update_manifest_for_model(&self, model_type: ModelType, sha256: String) -> Result<()> {
        let mut manifest = self.load_manifest().unwrap_or_default();
        let metadata = std::fs::metadata(self.model_path(model_type))?;

        let model_info = ModelInfo {
            filename: model_type.filename(),
            size_bytes: metadata.len(),
            sha256,
            downloaded_at: unix_now(),
        };

        if let Some(existing) = manifest
            .models
            .iter_mut()
            .find(|m| m.filename == model_info.filename)
        {
            *existing = model_info;
        } else {
            manifest.models.push(model_info);
        }

        self.save_manifest(&manifest)
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.models_dir.join("manifest.json");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: ModelManifest = serde_json::from_str(&content)?;
            Ok(manifest)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.models_dir.join("manifest.json");
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// Stream `url` into `path` through a temp file; returns the SHA-256 of the content
async fn download_file(url: &str, path: &Path) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    debug!("Download size: {:?} bytes", response.content_length());

    let temp_path = path.with_extension("tmp");
    let mut file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write to temp file")?;
        hasher.update(&chunk);
    }

    file.flush().context("Failed to flush temp file")?;
    drop(file);

    std::fs::rename(&temp_path, path)
        .context("Failed to move downloaded file to final location")?;

    Ok(format!("{:x}", hasher.finalize()))
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file.
    ///
    /// With `use_gpu` the CUDA execution provider is required; if it cannot be
    /// registered the session fails instead of silently running on CPU.
    pub fn new(model_path: &Path, use_gpu: bool) -> Result<Self> {
        info!("Loading ONNX model from {:?} (gpu: {})", model_path, use_gpu);

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        let builder = if use_gpu {
            builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .build()
                    .error_on_failure()])
                .context("GPU acceleration requested but the CUDA execution provider is unavailable")?
        } else {
            builder
        };

        let session = builder
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))?;

        let input_names: Vec<String> = session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect();

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();

        debug!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}",
            input_names, output_names
        );

        Ok(Self {
            session,
            input_names,
            output_names,
        })
    }

    /// Run the model on one NCHW tensor and copy out its first output
    pub fn run(&mut self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        let input_name = self
            .input_names
            .first()
            .cloned()
            .context("Model declares no inputs")?;
        let output_name = self
            .output_names
            .first()
            .cloned()
            .context("Model declares no outputs")?;

        let tensor = TensorRef::from_array_view(input).context("Failed to create input tensor")?;
        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => tensor])
            .context("ONNX Runtime inference failed")?;

        let (shape, data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .with_context(|| format!("Failed to extract output tensor '{}' as f32", output_name))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
            .context("Output tensor shape does not match its data")
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
