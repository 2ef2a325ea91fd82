//! Common test utilities for E2E tests
#![allow(dead_code)]

use axum::async_trait;
use compress3::error::AppError;
use compress3::storage::ObjectStore;
use compress3::{AppState, config};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Object store that keeps uploads in memory, keyed by `bucket/key`
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl InMemoryStore {
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.object(bucket, key).map(|object| object.bytes)
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.object(bucket, key).map(|object| object.content_type)
    }

    fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{bucket}/{key}"))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn upload(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<(), AppError> {
        let bytes = tokio::fs::read(local_path).await?;
        self.objects.lock().unwrap().insert(
            format!("{bucket}/{key}"),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}

/// Object store that rejects every upload
pub struct RejectingStore;

#[async_trait]
impl ObjectStore for RejectingStore {
    async fn upload(
        &self,
        _local_path: &Path,
        _bucket: &str,
        key: &str,
        _content_type: &str,
    ) -> Result<(), AppError> {
        Err(AppError::StorageUpload(format!("{key}: access denied")))
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub scratch_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a test server backed by `store`
    pub async fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        let scratch_dir = TempDir::new().unwrap();

        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_body_bytes: config::DEFAULT_MAX_BODY_BYTES,
                temp_dir: Some(scratch_dir.path().to_path_buf()),
            },
            storage: config::StorageConfig {
                bucket: "test-bucket".to_string(),
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

        let state = AppState::with_store(config, store);

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = compress3::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            scratch_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// POST `bytes` as the `file` field of a multipart form
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.client
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    /// Whether every per-request scratch directory has been removed
    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch_dir.path())
            .unwrap()
            .next()
            .is_none()
    }
}

/// Smooth RGB test image
pub fn gradient_image(width: u32, height: u32) -> image::RgbImage {
    image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            96,
        ])
    })
}

/// Encode `image` in `format` into memory
pub fn encode_as(image: image::RgbImage, format: image::ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

/// One blank page with a 300x200pt MediaBox
pub fn blank_pdf() -> Vec<u8> {
    use lopdf::{Document, Object, Stream, dictionary};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![0_i64.into(), 0_i64.into(), 300_i64.into(), 200_i64.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1_i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
