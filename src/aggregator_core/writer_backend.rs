//! Writer backend trait for finalized bundles
//!
//! Defines the interface for publishing a bundle snapshot to different
//! backends.

use super::bundle::Bundle;
use async_trait::async_trait;

#[derive(Debug)]
pub enum BundleWriterError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
}

impl From<std::io::Error> for BundleWriterError {
    fn from(err: std::io::Error) -> Self {
        BundleWriterError::Io(err)
    }
}

impl From<serde_json::Error> for BundleWriterError {
    fn from(err: serde_json::Error) -> Self {
        BundleWriterError::Serialization(err)
    }
}

impl std::fmt::Display for BundleWriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleWriterError::Io(e) => write!(f, "IO error: {}", e),
            BundleWriterError::Serialization(e) => write!(f, "Serialization error: {}", e),
            BundleWriterError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for BundleWriterError {}

/// Backend trait for publishing bundles
#[async_trait]
pub trait BundleWriterBackend: Send {
    /// Publish one finalized bundle
    async fn write_bundle(&mut self, bundle: &Bundle) -> Result<(), BundleWriterError>;

    /// Flush pending writes to storage
    async fn flush(&mut self) -> Result<(), BundleWriterError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
