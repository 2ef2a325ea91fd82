//! Upload endpoints

use axum::{
    Router,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{Html, Json},
    routing::{get, post},
};

use super::dto::{DisplayResponse, UploadResponse};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};
use crate::service::{UploadOutcome, UploadService, UploadedAsset};
use crate::storage::public_url;

const HOME_PAGE: &str = include_str!("home.html");

/// Create upload router
///
/// Routes:
/// - GET /home
/// - POST /upload
/// - GET /display/:filename
pub fn upload_router() -> Router<AppState> {
    Router::new()
        .route("/home", get(home))
        .route("/upload", post(upload_file))
        .route("/display/:filename", get(display_file))
}

/// GET /home
async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

/// POST /upload
///
/// Accepts a multipart form with a single `file` field. The first field
/// named `file` that carries a filename is used; other fields are ignored.
async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/upload"])
        .start_timer();

    let result = receive_and_process(&state, multipart).await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(error) => error.status_and_kind().0,
    };
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/upload", status.as_str()])
        .inc();

    result.map(|outcome| Json(UploadResponse::from(outcome)))
}

async fn receive_and_process(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadOutcome, AppError> {
    // A body that is not multipart at all has no file part either.
    let mut multipart = multipart.map_err(|_| AppError::MissingFile)?;
    let max_body_bytes = state.config.server.max_body_bytes;

    let mut asset: Option<UploadedAsset> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_body_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_body_bytes))?;

        asset = Some(UploadedAsset {
            filename,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let asset = asset.ok_or(AppError::MissingFile)?;

    let service = UploadService::new(
        state.store.clone(),
        state.config.storage.bucket.clone(),
        state.config.server.scratch_root(),
    );
    service.process(asset).await
}

/// GET /display/:filename
///
/// Builds the public URL for `filename`; storage is not consulted.
async fn display_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Json<DisplayResponse> {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&["GET", "/display", "200"])
        .inc();

    Json(DisplayResponse {
        file_url: public_url(&state.config.storage.bucket, &filename),
    })
}

fn multipart_error(error: MultipartError, max_body_bytes: usize) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(max_body_bytes)
    } else {
        AppError::Validation(format!("Failed to parse multipart: {}", error.body_text()))
    }
}
