//! Ingestion pipeline: configuration plus the single-pass run orchestration

pub mod config;
pub mod run;

pub use config::{AggregationConfig, RejectPolicy};
pub use run::{standard_engine, IngestError, IngestionRun};
