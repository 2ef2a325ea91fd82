//! API layer
//!
//! HTTP handlers for:
//! - Upload, display, and the upload form
//! - Metrics (Prometheus)

mod dto;
pub mod metrics;
mod upload;

pub use dto::*;

pub use metrics::metrics_router;
pub use upload::upload_router;
