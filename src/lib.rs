//! compress3 - upload an image or PDF, halve it, publish both copies
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - POST /upload, GET /display/:filename, GET /home          │
//! │  - GET /health, GET /metrics                                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Filename sanitization, scratch directories               │
//! │  - Compression on the blocking pool                         │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                              │
//! ┌───────────────────────────────┐ ┌───────────────────────────┐
//! │          Compressor           │ │      Object Storage       │
//! │  - Quality search (85 → 15)   │ │  - S3 PutObject           │
//! │  - PDF first-page raster      │ │  - Public URL convention  │
//! └───────────────────────────────┘ └───────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Upload orchestration
//! - `compress`: Quality-search compressor
//! - `storage`: Object store trait and S3 implementation
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod compress;
pub mod config;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Built once at startup and cloned per request. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Destination for original and compressed objects
    pub store: Arc<dyn storage::ObjectStore>,
}

impl AppState {
    /// Initialize application state with an S3 object store
    ///
    /// # Errors
    /// Returns error if the S3 client cannot be configured
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let store = storage::S3ObjectStore::new(&config.storage).await?;
        tracing::info!(bucket = %config.storage.bucket, "Object storage initialized");

        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Build state around an existing object store
    pub fn with_store(config: config::AppConfig, store: Arc<dyn storage::ObjectStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, extract::DefaultBodyLimit};
    use tower_http::trace::TraceLayer;

    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::upload_router())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        test_state_with_limit(config::DEFAULT_MAX_BODY_BYTES)
    }

    fn test_state_with_limit(max_body_bytes: usize) -> AppState {
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_body_bytes,
                temp_dir: None,
            },
            storage: config::StorageConfig {
                bucket: "compress3".to_string(),
                region: "us-east-1".to_string(),
                endpoint_url: None,
                force_path_style: false,
                access_key_id: None,
                secret_access_key: None,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        let mut store = storage::MockObjectStore::new();
        store.expect_upload().times(0);
        AppState::with_store(config, Arc::new(store))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn display_formats_public_url_without_lookup() {
        let response = build_router(test_state())
            .oneshot(
                Request::get("/display/never-uploaded.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["file_url"],
            "https://compress3.s3.amazonaws.com/never-uploaded.png"
        );
    }

    #[tokio::test]
    async fn upload_without_multipart_body_reports_missing_file() {
        let response = build_router(test_state())
            .oneshot(
                Request::post("/upload")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "No file part");
    }

    fn multipart_upload(filename: &str, payload: &[u8]) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let mut body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::post("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn upload_over_body_limit_is_payload_too_large() {
        let response = build_router(test_state_with_limit(1024))
            .oneshot(multipart_upload("big.png", &[0_u8; 8 * 1024]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            body_json(response).await["error"],
            "File too large: exceeds 1024 bytes"
        );
    }

    #[tokio::test]
    async fn upload_at_default_limit_rejects_larger_bodies() {
        let payload = vec![0_u8; config::DEFAULT_MAX_BODY_BYTES + 1024 * 1024];
        let response = build_router(test_state())
            .oneshot(multipart_upload("scan.pdf", &payload))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            body_json(response).await["error"],
            "File too large: exceeds 16777216 bytes"
        );
    }

    #[tokio::test]
    async fn rejected_uploads_are_counted_with_their_status() {
        use crate::metrics::HTTP_REQUESTS_TOTAL;

        let counter = HTTP_REQUESTS_TOTAL.with_label_values(&["POST", "/upload", "400"]);
        let before = counter.get();

        let response = build_router(test_state())
            .oneshot(multipart_upload("notes.txt", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(counter.get() > before);
    }

    #[tokio::test]
    async fn upload_with_empty_filename_is_rejected() {
        let response = build_router(test_state())
            .oneshot(multipart_upload("", b""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"],
            "No file selected for uploading"
        );
    }

    #[tokio::test]
    async fn home_serves_upload_form() {
        let response = build_router(test_state())
            .oneshot(Request::get("/home").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("name=\"file\""));
        assert!(html.contains("action=\"/upload\""));
    }
}
