//! SQLite writer for finalized bundles
//!
//! Keeps a history of snapshots in a `bundles` table; consumers read the
//! newest row. The full bundle travels as a JSON payload so the table schema
//! never chases the bundle schema.

use super::bundle::Bundle;
use super::writer_backend::{BundleWriterBackend, BundleWriterError};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;

const CREATE_BUNDLES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS bundles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    generated_at TEXT NOT NULL,
    schema_version INTEGER NOT NULL,
    source_records INTEGER NOT NULL,
    rejected_records INTEGER NOT NULL,
    payload TEXT NOT NULL
)";

pub struct SqliteBundleWriter {
    conn: Connection,
}

impl SqliteBundleWriter {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, BundleWriterError> {
        let conn = Connection::open(db_path.as_ref())
            .map_err(|e| BundleWriterError::Database(e.to_string()))?;
        conn.execute(CREATE_BUNDLES_TABLE, [])
            .map_err(|e| BundleWriterError::Database(e.to_string()))?;

        log::info!("✅ SQLite bundle writer initialized");

        Ok(Self { conn })
    }
}

#[async_trait]
impl BundleWriterBackend for SqliteBundleWriter {
    async fn write_bundle(&mut self, bundle: &Bundle) -> Result<(), BundleWriterError> {
        let payload = serde_json::to_string(bundle)?;

        self.conn
            .execute(
                "INSERT INTO bundles (generated_at, schema_version, source_records, rejected_records, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    bundle.meta.generated_at,
                    bundle.meta.schema_version,
                    bundle.meta.source_records,
                    bundle.meta.rejected_records,
                    payload,
                ],
            )
            .map_err(|e| BundleWriterError::Database(e.to_string()))?;

        log::debug!(
            "✅ Bundle snapshot written: {} records, {} rejected",
            bundle.meta.source_records,
            bundle.meta.rejected_records
        );

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), BundleWriterError> {
        // Inserts are committed per statement; nothing to flush
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator_core::bundle::{BundleMeta, ThresholdsMeta, SCHEMA_VERSION};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn bundle_with_records(source_records: u64) -> Bundle {
        Bundle {
            meta: BundleMeta {
                schema_version: SCHEMA_VERSION,
                generated_at: "2024-12-31T12:00:00+00:00".to_string(),
                source_records,
                rejected_records: 1,
                stock_age_thresholds: ThresholdsMeta {
                    fresh_max_days: 30.0,
                    normal_max_days: 90.0,
                },
                top_brands_limit: 10,
                stock_share_basis: "transactions".to_string(),
                currency: "INR".to_string(),
            },
            kpis: BTreeMap::new(),
            categories: vec![],
            monthly_trends: vec![],
            stock_ageing: vec![],
            pos_data: vec![],
            sub_categories: vec![],
            top_brands: vec![],
            margin_analysis: vec![],
        }
    }

    #[tokio::test]
    async fn test_sqlite_bundle_write() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteBundleWriter::new(&db_path).unwrap();

        writer.write_bundle(&bundle_with_records(7)).await.unwrap();
        writer.flush().await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let (source_records, schema_version, payload): (u64, u32, String) = conn
            .query_row(
                "SELECT source_records, schema_version, payload FROM bundles",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(source_records, 7);
        assert_eq!(schema_version, SCHEMA_VERSION);

        let read_back: Bundle = serde_json::from_str(&payload).unwrap();
        assert_eq!(read_back.meta.source_records, 7);
    }

    #[tokio::test]
    async fn test_snapshot_history_accumulates() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let mut writer = SqliteBundleWriter::new(&db_path).unwrap();

        writer.write_bundle(&bundle_with_records(1)).await.unwrap();
        writer.write_bundle(&bundle_with_records(2)).await.unwrap();
        writer.write_bundle(&bundle_with_records(3)).await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM bundles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);

        // Latest row wins for consumers
        let latest: u64 = conn
            .query_row(
                "SELECT source_records FROM bundles ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(latest, 3);
    }
}
