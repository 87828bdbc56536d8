//! JSON file writer for finalized bundles
//!
//! Publishes atomically: the bundle is serialized to a sibling temp file and
//! renamed over the target, so a concurrent reader never observes a torn
//! snapshot.

use super::bundle::Bundle;
use super::writer_backend::{BundleWriterBackend, BundleWriterError};
use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub struct JsonBundleWriter {
    target: PathBuf,
}

impl JsonBundleWriter {
    pub fn new(target: PathBuf) -> std::io::Result<Self> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        log::info!("📝 Writing bundle to: {}", target.display());
        Ok(Self { target })
    }

    fn write_atomic(&self, bundle: &Bundle) -> Result<(), BundleWriterError> {
        let json = serde_json::to_string_pretty(bundle)?;

        let tmp_path = self.target.with_extension("json.tmp");
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.target)?;
        Ok(())
    }
}

#[async_trait]
impl BundleWriterBackend for JsonBundleWriter {
    async fn write_bundle(&mut self, bundle: &Bundle) -> Result<(), BundleWriterError> {
        self.write_atomic(bundle)
    }

    async fn flush(&mut self) -> Result<(), BundleWriterError> {
        // write_bundle publishes synchronously; nothing is buffered
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSON"
    }
}
