//! API response DTOs

use serde::{Deserialize, Serialize};

use crate::service::UploadOutcome;

/// Message returned with every successful upload
pub const UPLOAD_SUCCESS_MESSAGE: &str = "File successfully uploaded and compressed";

/// POST /upload response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadResponse {
    pub message: String,
    pub original_file_url: String,
    pub compressed_file_url: String,
    pub initial_file_size: u64,
    pub compressed_file_size: u64,
}

impl From<UploadOutcome> for UploadResponse {
    fn from(outcome: UploadOutcome) -> Self {
        Self {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            original_file_url: outcome.original_file_url,
            compressed_file_url: outcome.compressed_file_url,
            initial_file_size: outcome.initial_size,
            compressed_file_size: outcome.compressed_size,
        }
    }
}

/// GET /display/{filename} response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayResponse {
    pub file_url: String,
}
