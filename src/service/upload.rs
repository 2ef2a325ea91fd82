//! Upload service
//!
//! Stages an uploaded file in a request-scoped scratch directory, compresses
//! it, and pushes both artifacts to the object store.

use std::path::PathBuf;
use std::sync::Arc;

use super::filename::{compressed_filename, secure_filename};
use crate::compress::{FileType, compress};
use crate::error::AppError;
use crate::metrics::UPLOADS_TOTAL;
use crate::storage::{ObjectStore, public_url};

/// File received from a client
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    /// Filename as declared by the client, unsanitized
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedAsset {
    /// Extension declared by the client filename, if any
    pub fn declared_extension(&self) -> Option<&str> {
        self.filename.rsplit_once('.').map(|(_, ext)| ext)
    }

    /// Reject empty filenames and extensions outside the allowed set
    pub fn validate(&self) -> Result<FileType, AppError> {
        if self.filename.is_empty() {
            return Err(AppError::EmptyFilename);
        }
        self.declared_extension()
            .and_then(FileType::from_extension)
            .ok_or(AppError::DisallowedExtension)
    }
}

/// Stored artifacts and their sizes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub original_file_url: String,
    pub compressed_file_url: String,
    pub initial_size: u64,
    pub compressed_size: u64,
}

/// Upload service
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    scratch_root: PathBuf,
}

impl UploadService {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String, scratch_root: PathBuf) -> Self {
        Self {
            store,
            bucket,
            scratch_root,
        }
    }

    /// Validate, compress, and store `asset`.
    ///
    /// Both objects are uploaded only after compression succeeds. The scratch
    /// directory is removed when this returns, on success and on error.
    pub async fn process(&self, asset: UploadedAsset) -> Result<UploadOutcome, AppError> {
        asset.validate()?;

        let original_key = secure_filename(&asset.filename);
        let file_type =
            FileType::from_filename(&original_key).ok_or(AppError::DisallowedExtension)?;
        let compressed_key = compressed_filename(&original_key);

        tokio::fs::create_dir_all(&self.scratch_root).await?;
        let scratch = tempfile::Builder::new()
            .prefix("compress3-")
            .tempdir_in(&self.scratch_root)?;

        let original_path = scratch.path().join(&original_key);
        let compressed_path = scratch.path().join(&compressed_key);
        tokio::fs::write(&original_path, &asset.bytes).await?;
        drop(asset);

        tracing::info!(
            key = %original_key,
            %file_type,
            "Staged upload for compression"
        );

        let result = {
            let original_path = original_path.clone();
            let compressed_path = compressed_path.clone();
            tokio::task::spawn_blocking(move || {
                compress(&original_path, &compressed_path, file_type)
            })
            .await
            .map_err(|e| AppError::Internal(e.into()))??
        };

        // A GIF's compressed copy holds JPEG bytes; label objects by content.
        self.store
            .upload(
                &original_path,
                &self.bucket,
                &original_key,
                file_type.content_type(),
            )
            .await?;
        self.store
            .upload(
                &result.compressed_path,
                &self.bucket,
                &compressed_key,
                file_type.output_format().content_type(),
            )
            .await?;

        tracing::info!(
            bucket = %self.bucket,
            original = %original_key,
            compressed = %compressed_key,
            "Stored original and compressed objects"
        );

        UPLOADS_TOTAL.with_label_values(&[file_type.as_str()]).inc();

        Ok(UploadOutcome {
            original_file_url: public_url(&self.bucket, &original_key),
            compressed_file_url: public_url(&self.bucket, &compressed_key),
            initial_size: result.initial_size,
            compressed_size: result.compressed_size,
        })
    }
}
