//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("compress3_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "compress3_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Upload Metrics
    pub static ref UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("compress3_uploads_total", "Total number of accepted uploads"),
        &["file_type"]
    ).expect("metric can be created");

    // Compression Metrics
    pub static ref COMPRESSION_ATTEMPTS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "compress3_compression_attempts",
            "Encode attempts needed per compression run"
        ).buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 12.0, 15.0]),
        &["file_type"]
    ).expect("metric can be created");
    pub static ref COMPRESSION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "compress3_compression_duration_seconds",
            "Wall time spent in the compression loop"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["file_type"]
    ).expect("metric can be created");
    pub static ref COMPRESSION_BYTES_IN: IntCounter = IntCounter::new(
        "compress3_compression_bytes_in_total",
        "Total bytes of input handed to the compressor"
    ).expect("metric can be created");
    pub static ref COMPRESSION_BYTES_OUT: IntCounter = IntCounter::new(
        "compress3_compression_bytes_out_total",
        "Total bytes of compressed output produced"
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref STORAGE_UPLOADS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("compress3_storage_uploads_total", "Total number of object store uploads"),
        &["status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("compress3_errors_total", "Total number of errors returned to clients"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(UPLOADS_TOTAL.clone()))
        .expect("UPLOADS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(COMPRESSION_ATTEMPTS.clone()))
        .expect("COMPRESSION_ATTEMPTS can be registered");
    REGISTRY
        .register(Box::new(COMPRESSION_DURATION_SECONDS.clone()))
        .expect("COMPRESSION_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(COMPRESSION_BYTES_IN.clone()))
        .expect("COMPRESSION_BYTES_IN can be registered");
    REGISTRY
        .register(Box::new(COMPRESSION_BYTES_OUT.clone()))
        .expect("COMPRESSION_BYTES_OUT can be registered");
    REGISTRY
        .register(Box::new(STORAGE_UPLOADS_TOTAL.clone()))
        .expect("STORAGE_UPLOADS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
