//! Object storage module
//!
//! Handles:
//! - Pushing local files to an S3 bucket
//! - Public URL generation for stored objects

mod s3;

pub use s3::S3ObjectStore;

use axum::async_trait;
use std::path::Path;

use crate::error::AppError;

/// Destination for original and compressed artifacts
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local_path` to `bucket` under `key`, recorded with
    /// `content_type`
    ///
    /// # Errors
    /// Returns [`AppError::StorageUpload`] if the store rejects the object
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), AppError>;
}

/// Public URL of `key` in `bucket`.
///
/// Pure string formatting; the object is not checked for existence.
pub fn public_url(bucket: &str, key: &str) -> String {
    format!("https://{}.s3.amazonaws.com/{}", bucket, key)
}

pub(crate) fn build_s3_http_client() -> aws_sdk_s3::config::SharedHttpClient {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;

    // Plain http stays enabled for S3-compatible endpoints on a private network.
    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    HyperClientBuilder::new().build(https_connector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_follows_virtual_hosted_convention() {
        assert_eq!(
            public_url("compress3", "photo_compressed.jpg"),
            "https://compress3.s3.amazonaws.com/photo_compressed.jpg"
        );
    }
}
