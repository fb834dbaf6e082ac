//! OCR (Optical Character Recognition) module
//!
//! Uses PaddleOCR models via ONNX Runtime for text detection and recognition.

use anyhow::{Context, Result};
use ndarray::{Array3, Axis, Ix2, Ix4};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, info, trace};

use super::decode::CtcDecoder;
use super::detection::{DbPostProcess, TextBox};
use super::frame::PixelBuffer;
use super::models::{ModelPaths, OnnxSession};
use super::preprocess::{
    crop_box, preprocess_for_detection, preprocess_for_recognition, rgb_to_f32, PreprocessConfig,
};
use super::Recognizer;
use crate::config::EngineSettings;

/// Single OCR detection result
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Recognized text
    pub text: String,
    /// Bounding box (x, y, width, height)
    pub bounds: (u32, u32, u32, u32),
    /// Recognition confidence
    pub confidence: f32,
}

/// OCR engine using PaddleOCR via ONNX Runtime.
///
/// ONNX Runtime needs exclusive access to a session while it runs, so each
/// model sits behind its own lock. Concurrent requests therefore serialize per
/// model, while decoding and preprocessing still run in parallel.
pub struct OcrEngine {
    detector: Mutex<OnnxSession>,
    recognizer: Mutex<OnnxSession>,
    decoder: CtcDecoder,
    postprocess: DbPostProcess,
    preprocess: PreprocessConfig,
    recognition_threshold: f32,
}

impl OcrEngine {
    /// Initialize OCR engine from downloaded model files
    pub fn new(paths: &ModelPaths, settings: &EngineSettings) -> Result<Self> {
        let detector = OnnxSession::new(&paths.detection, settings.use_gpu)
            .context("Failed to load text detection model")?;
        let recognizer = OnnxSession::new(&paths.recognition, settings.use_gpu)
            .context("Failed to load text recognition model")?;
        let decoder = CtcDecoder::load(&paths.dictionary)?;

        info!(
            "OCR engine ready ({} character classes)",
            decoder.num_classes()
        );

        Ok(Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
            decoder,
            postprocess: DbPostProcess {
                threshold: settings.det_threshold,
                box_threshold: settings.box_threshold,
                unclip_ratio: settings.unclip_ratio,
                ..DbPostProcess::default()
            },
            preprocess: PreprocessConfig {
                det_limit_side_len: settings.det_limit_side_len,
                ..PreprocessConfig::default()
            },
            recognition_threshold: settings.recognition_threshold,
        })
    }

    /// Run detection and recognition, keeping region geometry and confidence
    pub fn recognize_regions(&self, pixels: &PixelBuffer) -> Result<Vec<OcrResult>> {
        if pixels.is_empty() {
            anyhow::bail!(
                "Cannot run OCR on an empty {}x{} image",
                pixels.width,
                pixels.height
            );
        }

        let start = Instant::now();
        let image = rgb_to_f32(pixels);
        let boxes = self.detect(&image, pixels.width, pixels.height)?;

        let mut results = Vec::with_capacity(boxes.len());
        for text_box in &boxes {
            if let Some(result) = self.recognize_box(&image, text_box)? {
                results.push(result);
            }
        }

        debug!(
            "OCR on {}x{} image: {} boxes, {} fragments in {:?}",
            pixels.width,
            pixels.height,
            boxes.len(),
            results.len(),
            start.elapsed()
        );

        Ok(results)
    }

    fn detect(&self, image: &Array3<f32>, width: u32, height: u32) -> Result<Vec<TextBox>> {
        let input = preprocess_for_detection(image, &self.preprocess);
        let output = self.detector.lock().run(input.view())?;

        // DB output is [1, 1, H, W]
        let output = output
            .into_dimensionality::<Ix4>()
            .context("Detection model returned an unexpected output shape")?;
        let map = output.index_axis(Axis(0), 0).index_axis_move(Axis(0), 0);

        Ok(self.postprocess.boxes_from_map(map, width, height))
    }

    fn recognize_box(&self, image: &Array3<f32>, text_box: &TextBox) -> Result<Option<OcrResult>> {
        let crop = crop_box(image, text_box);
        let input = preprocess_for_recognition(&crop, &self.preprocess);
        let output = self.recognizer.lock().run(input.view())?;

        // Recognition output is [1, T, C]
        let output = output
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .context("Recognition model returned an unexpected output shape")?;
        let (text, confidence) = self.decoder.decode(output.view());

        let text = text.trim();
        if text.is_empty() || confidence < self.recognition_threshold {
            return Ok(None);
        }

        Ok(Some(OcrResult {
            text: text.to_string(),
            bounds: text_box.bounds(),
            confidence,
        }))
    }
}

impl Recognizer for OcrEngine {
    fn recognize(&self, pixels: &PixelBuffer) -> Result<Vec<String>> {
        Ok(self
            .recognize_regions(pixels)?
            .into_iter()
            .map(|result| {
                trace!(
                    "Fragment {:?} at {:?} (confidence {:.2})",
                    result.text,
                    result.bounds,
                    result.confidence
                );
                result.text
            })
            .collect())
    }
}
