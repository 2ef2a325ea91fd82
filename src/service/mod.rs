//! Service layer
//!
//! Business logic between HTTP handlers and the compressor/object store.

mod filename;
mod upload;

pub use filename::{compressed_filename, secure_filename};
pub use upload::{UploadOutcome, UploadService, UploadedAsset};
