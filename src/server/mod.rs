//! HTTP Server
//!
//! Two routes: `POST /ocr` and `GET /health`. Cross-origin requests are
//! allowed from anywhere so browser clients can call the service directly.

pub mod handlers;
pub mod payload;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::vision::EngineHandle;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    /// The process-wide recognition engine
    pub engine: EngineHandle,
}

/// Build the router with all routes and middleware
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/ocr", post(handlers::extract_text))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve `app` on an already bound listener until Ctrl+C
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    info!("OCR service listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("OCR service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::handlers::{HealthResponse, OcrEnvelope};
    use super::payload::tests::white_png_data_uri;
    use super::*;
    use crate::vision::{PixelBuffer, Recognizer};
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::response::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    /// Reports nothing for blank images and a fixed word list otherwise
    struct FakeRecognizer {
        words: Vec<String>,
        calls: AtomicUsize,
    }

    impl FakeRecognizer {
        fn new(words: &[&str]) -> Self {
            Self {
                words: words.iter().map(|w| w.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Recognizer for FakeRecognizer {
        fn recognize(&self, pixels: &PixelBuffer) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if pixels.data.iter().all(|&v| v == 255) {
                return Ok(Vec::new());
            }
            Ok(self.words.clone())
        }
    }

    struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn recognize(&self, _pixels: &PixelBuffer) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("unsupported pixel layout")
        }
    }

    struct PanickingRecognizer;

    impl Recognizer for PanickingRecognizer {
        fn recognize(&self, _pixels: &PixelBuffer) -> anyhow::Result<Vec<String>> {
            panic!("engine crashed")
        }
    }

    fn app_with(engine: Arc<dyn Recognizer>) -> Router {
        build_router(AppState { engine }, 1024 * 1024)
    }

    fn ocr_request(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/ocr")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    fn dark_png_data_uri() -> String {
        let image = image::RgbImage::from_pixel(12, 8, image::Rgb([0, 0, 0]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        use base64::Engine;
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes.into_inner())
        )
    }

    async fn envelope(response: Response) -> (StatusCode, OcrEnvelope) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_blank_png_returns_empty_text() {
        let app = app_with(Arc::new(FakeRecognizer::new(&["HELLO"])));
        let body = serde_json::json!({ "image": white_png_data_uri(10, 10) }).to_string();

        let (status, envelope) = envelope(app.oneshot(ocr_request(body)).await.unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope, OcrEnvelope::success(String::new()));
    }

    #[tokio::test]
    async fn test_fragments_are_space_joined() {
        let app = app_with(Arc::new(FakeRecognizer::new(&["HELLO", "WORLD"])));
        let body = serde_json::json!({ "image": dark_png_data_uri() }).to_string();

        let (status, envelope) = envelope(app.oneshot(ocr_request(body)).await.unwrap()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(envelope.text.as_deref(), Some("HELLO WORLD"));
        assert!(envelope.error.is_none());
    }

    #[tokio::test]
    async fn test_identical_requests_are_idempotent() {
        let engine = Arc::new(FakeRecognizer::new(&["HELLO"]));
        let app = app_with(engine.clone());
        let body = serde_json::json!({ "image": dark_png_data_uri() }).to_string();

        let (_, first) = envelope(app.clone().oneshot(ocr_request(body.clone())).await.unwrap()).await;
        let (_, second) = envelope(app.oneshot(ocr_request(body)).await.unwrap()).await;

        assert_eq!(first, second);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_separator_is_a_failure() {
        let app = app_with(Arc::new(FakeRecognizer::new(&["HELLO"])));
        let body = serde_json::json!({ "image": "notbase64nodata" }).to_string();

        let (status, envelope) = envelope(app.oneshot(ocr_request(body)).await.unwrap()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!envelope.success);
        assert!(!envelope.error.unwrap().is_empty());
        assert!(envelope.text.is_none());
    }

    #[tokio::test]
    async fn test_missing_image_field_is_a_failure() {
        let engine = Arc::new(FakeRecognizer::new(&["HELLO"]));
        let app = app_with(engine.clone());

        let (status, envelope) = envelope(app.oneshot(ocr_request("{}")).await.unwrap()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!envelope.success);
        assert!(envelope.error.is_some());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_failure_envelope() {
        let app = app_with(Arc::new(FakeRecognizer::new(&["HELLO"])));

        let (status, envelope) =
            envelope(app.oneshot(ocr_request("{\"image\": ")).await.unwrap()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!envelope.success);
    }

    #[tokio::test]
    async fn test_non_image_payload_is_a_failure() {
        let app = app_with(Arc::new(FakeRecognizer::new(&["HELLO"])));
        let body = serde_json::json!({ "image": "data:image/png;base64,aGVsbG8gd29ybGQ=" }).to_string();

        let (status, envelope) = envelope(app.oneshot(ocr_request(body)).await.unwrap()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!envelope.success);
    }

    #[tokio::test]
    async fn test_engine_error_is_a_failure_and_service_keeps_serving() {
        let app = app_with(Arc::new(FailingRecognizer));
        let body = serde_json::json!({ "image": dark_png_data_uri() }).to_string();

        let (status, envelope) =
            envelope(app.clone().oneshot(ocr_request(body)).await.unwrap()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(envelope.error.unwrap().contains("unsupported pixel layout"));

        let health = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_engine_panic_is_contained() {
        let app = app_with(Arc::new(PanickingRecognizer));
        let body = serde_json::json!({ "image": dark_png_data_uri() }).to_string();

        let (status, envelope) = envelope(app.oneshot(ocr_request(body)).await.unwrap()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!envelope.success);
    }

    #[tokio::test]
    async fn test_oversized_body_is_a_failure_envelope() {
        let app = build_router(
            AppState {
                engine: Arc::new(FakeRecognizer::new(&["HELLO"])),
            },
            64,
        );
        let body = serde_json::json!({ "image": white_png_data_uri(10, 10) }).to_string();

        let (status, envelope) = envelope(app.oneshot(ocr_request(body)).await.unwrap()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!envelope.success);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_with(Arc::new(FailingRecognizer));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "ok");
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = app_with(Arc::new(FakeRecognizer::new(&[])));

        let preflight = Request::builder()
            .method(Method::OPTIONS)
            .uri("/ocr")
            .header(header::ORIGIN, "http://localhost:8080")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(preflight).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );

        let get = Request::get("/health")
            .header(header::ORIGIN, "https://example.org")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(get).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
