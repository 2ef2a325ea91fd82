//! S3 object store
//!
//! Streams request-scoped temp files to S3 (or any S3-compatible endpoint).
//! Objects are addressed publicly via [`super::public_url`].

use aws_sdk_s3::Client as S3Client;
use std::path::Path;

use super::{ObjectStore, build_s3_http_client};
use crate::config::StorageConfig;
use crate::error::AppError;
use crate::metrics::STORAGE_UPLOADS_TOTAL;

/// S3-backed [`ObjectStore`]
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3 client
    ///
    /// Static credentials from configuration take precedence; otherwise the
    /// default AWS provider chain (environment, profile, IMDS) is used.
    pub async fn new(config: &StorageConfig) -> Result<Self, AppError> {
        use aws_config::BehaviorVersion;
        use aws_sdk_s3::config::{Credentials, Region};

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .http_client(build_s3_http_client())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "compress3-static",
            ));
        }

        let shared = loader.load().await;
        let mut s3_config =
            aws_sdk_s3::config::Builder::from(&shared).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            s3_config = s3_config.endpoint_url(endpoint);
        }

        tracing::info!(
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 client configured"
        );

        Ok(Self {
            client: S3Client::from_conf(s3_config.build()),
        })
    }
}

#[axum::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), AppError> {
        use aws_sdk_s3::primitives::ByteStream;

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::StorageUpload(format!("could not read staged file for {}: {}", key, e))
        })?;

        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await;

        match result {
            Ok(_) => {
                STORAGE_UPLOADS_TOTAL.with_label_values(&["ok"]).inc();
                tracing::debug!(bucket, key, content_type, "Object uploaded");
                Ok(())
            }
            Err(e) => {
                STORAGE_UPLOADS_TOTAL.with_label_values(&["error"]).inc();
                Err(AppError::StorageUpload(format!("S3 upload of {} failed: {}", key, e)))
            }
        }
    }
}
