//! Route handlers and response envelopes

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::payload::{decode_request, OcrRequestError};
use super::AppState;
use crate::vision::EngineHandle;

/// Body of every `/ocr` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrEnvelope {
    pub fn success(text: String) -> Self {
        Self {
            success: true,
            text: Some(text),
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            text: None,
            error: Some(error),
        }
    }
}

/// Body of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl IntoResponse for OcrRequestError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(OcrEnvelope::failure(self.to_string())),
        )
            .into_response()
    }
}

/// Join recognized fragments the way clients expect: single spaces, engine order
pub fn join_fragments(fragments: &[String]) -> String {
    fragments.join(" ")
}

/// `POST /ocr`
pub async fn extract_text(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<OcrEnvelope>, OcrRequestError> {
    let request_id = Uuid::new_v4();
    let start = Instant::now();

    let result = match body {
        Ok(body) => {
            debug!(%request_id, body_bytes = body.len(), "OCR request received");
            run_ocr(state.engine.clone(), body).await
        }
        Err(rejection) => Err(OcrRequestError::UnreadableBody(rejection.body_text())),
    };

    match &result {
        Ok(text) => debug!(
            %request_id,
            text_chars = text.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "OCR request completed"
        ),
        Err(e) => warn!(%request_id, error = %e, "OCR request failed"),
    }

    result.map(|text| Json(OcrEnvelope::success(text)))
}

/// Decode and recognize on the blocking pool; both are CPU bound
async fn run_ocr(engine: EngineHandle, body: Bytes) -> Result<String, OcrRequestError> {
    tokio::task::spawn_blocking(move || {
        let pixels = decode_request(&body)?;
        debug!("Image decoded: {:?}", pixels.dimensions());

        let fragments = engine
            .recognize(&pixels)
            .map_err(|e| OcrRequestError::Recognition(format!("{e:#}")))?;
        Ok(join_fragments(&fragments))
    })
    .await
    .map_err(|e| OcrRequestError::Recognition(format!("recognition task did not complete: {e}")))?
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
