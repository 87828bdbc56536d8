//! Aggregator Core - Retail Analytics Aggregation Engine
//!
//! This module provides the streaming aggregation core that turns raw
//! transaction records into the aggregate tables and KPI scalars a dashboard
//! consumes.
//!
//! # Architecture
//!
//! ```text
//! JSONL records → RecordFileReader → RecordNormalizer
//!     ↓
//! AggregationEngine (registered groupings, one streaming pass)
//!     +
//! KpiSummarizer (scalar accumulation, same pass)
//!     ↓
//! BundleBuilder (tables + KPIs + metadata → immutable Bundle)
//!     ↓
//! BundleWriter → JSON or SQLite backend
//! ```

pub mod bundle;
pub mod engine;
pub mod format;
pub mod json_writer;
pub mod kpi;
pub mod normalizer;
pub mod reader;
pub mod sqlite_writer;
pub mod writer;
pub mod writer_backend;

pub use bundle::{Bundle, BundleBuilder, BundleMeta, SCHEMA_VERSION};
pub use engine::{
    AggregateRow, AggregationEngine, ConfigurationError, FinalizedTables, GroupKey,
    StockAgeThresholds,
};
pub use json_writer::JsonBundleWriter;
pub use kpi::{KpiSnapshot, KpiSummarizer};
pub use normalizer::{
    RawRecord, RecordNormalizer, TransactionRecord, UnknownCategoryPolicy, ValidationError,
};
pub use reader::RecordFileReader;
pub use sqlite_writer::SqliteBundleWriter;
pub use writer::{BackendType, BundleWriter};
pub use writer_backend::{BundleWriterBackend, BundleWriterError};
