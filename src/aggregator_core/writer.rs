//! Unified writer interface for finalized bundles
//!
//! Routes writes to either the JSON file or SQLite backend based on
//! configuration.

use super::bundle::Bundle;
use super::json_writer::JsonBundleWriter;
use super::sqlite_writer::SqliteBundleWriter;
use super::writer_backend::{BundleWriterBackend, BundleWriterError};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Json,
    Sqlite,
}

impl BackendType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "json" => Some(BackendType::Json),
            "sqlite" => Some(BackendType::Sqlite),
            _ => None,
        }
    }
}

/// Unified writer that routes to either the JSON or SQLite backend
pub enum BundleWriter {
    Json(JsonBundleWriter),
    Sqlite(SqliteBundleWriter),
}

impl BundleWriter {
    /// Create a new bundle writer based on backend type
    pub fn new(backend: BackendType, target: PathBuf) -> Result<Self, BundleWriterError> {
        match backend {
            BackendType::Json => {
                let writer = JsonBundleWriter::new(target)?;
                Ok(BundleWriter::Json(writer))
            }
            BackendType::Sqlite => {
                let writer = SqliteBundleWriter::new(target)?;
                Ok(BundleWriter::Sqlite(writer))
            }
        }
    }

    /// Publish a finalized bundle to the configured backend
    pub async fn write_bundle(&mut self, bundle: &Bundle) -> Result<(), BundleWriterError> {
        match self {
            BundleWriter::Json(w) => w.write_bundle(bundle).await,
            BundleWriter::Sqlite(w) => w.write_bundle(bundle).await,
        }
    }

    /// Flush pending writes to storage
    pub async fn flush(&mut self) -> Result<(), BundleWriterError> {
        match self {
            BundleWriter::Json(w) => w.flush().await,
            BundleWriter::Sqlite(w) => w.flush().await,
        }
    }

    /// Get backend type for logging
    pub fn backend_type(&self) -> &'static str {
        match self {
            BundleWriter::Json(_) => "JSON",
            BundleWriter::Sqlite(_) => "SQLite",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!(BackendType::from_str("json"), Some(BackendType::Json));
        assert_eq!(BackendType::from_str("sqlite"), Some(BackendType::Sqlite));
        assert_eq!(BackendType::from_str("csv"), None);
    }
}
