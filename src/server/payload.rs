//! Request payload decoding
//!
//! `POST /ocr` bodies carry `{"image": "<prefix>,<base64>"}`. Everything up to
//! and including the first comma is discarded.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::vision::PixelBuffer;

/// Standard alphabet; clients are inconsistent about padding
const PAYLOAD_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Body of `POST /ocr`
#[derive(Debug, Deserialize)]
pub struct OcrRequest {
    /// Data-URI style image string
    pub image: String,
}

/// Everything that can fail while handling one OCR request
#[derive(Debug, Error)]
pub enum OcrRequestError {
    #[error("could not read request body: {0}")]
    UnreadableBody(String),
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("image payload must look like '<prefix>,<base64 data>' but contains no ','")]
    MissingSeparator,
    #[error("invalid base64 image data: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("unsupported image data: {0}")]
    UnsupportedImage(#[from] image::ImageError),
    #[error("recognition failed: {0}")]
    Recognition(String),
}

/// Strip the data-URI prefix: returns the text after the first comma
pub fn split_data_uri(image: &str) -> Result<&str, OcrRequestError> {
    image
        .split_once(',')
        .map(|(_, payload)| payload)
        .ok_or(OcrRequestError::MissingSeparator)
}

/// Decode the base64 part of an image string into raw file bytes
pub fn decode_image_bytes(image: &str) -> Result<Vec<u8>, OcrRequestError> {
    let payload = split_data_uri(image)?;
    // Line-wrapped base64 is common when payloads are pasted by hand
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(PAYLOAD_BASE64.decode(compact)?)
}

/// Parse a raw request body all the way to pixels
pub fn decode_request(body: &[u8]) -> Result<PixelBuffer, OcrRequestError> {
    let request: OcrRequest = serde_json::from_slice(body)?;
    let bytes = decode_image_bytes(&request.image)?;
    let image = image::load_from_memory(&bytes)?;
    Ok(PixelBuffer::from_image(image))
}
