//! Aggregate Binary - Retail Analytics Ingestion Run
//!
//! Reads a JSONL file of transaction records, runs one aggregation pass, and
//! publishes the resulting bundle snapshot.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin aggregate -- --backend json
//! ```
//!
//! ## Environment Variables
//!
//! - RETAILFLOW_INPUT_PATH - Path to the records JSONL file (default: data/records.jsonl)
//! - RETAILFLOW_OUTPUT_PATH - Bundle target: JSON file path or SQLite db path
//!   (default: data/bundle.json, or data/retailflow.db with --backend sqlite)
//! - RETAILFLOW_CATEGORIES - Comma-separated category vocabulary (default: Fashion,Grocery)
//! - RETAILFLOW_UNKNOWN_CATEGORY - reject | other (default: reject)
//! - RETAILFLOW_FRESH_MAX_DAYS / RETAILFLOW_NORMAL_MAX_DAYS - Stock-age bucket bounds (default: 30 / 90)
//! - RETAILFLOW_TOP_BRANDS_LIMIT - Brands kept per category (default: 10)
//! - RETAILFLOW_REJECT_POLICY - skip | abort (default: skip)
//! - RETAILFLOW_MAX_REJECTED - Reject count that aborts a skip-policy run (default: 1000)
//! - RETAILFLOW_CURRENCY - Currency label in KPI names (default: INR)
//! - RUST_LOG - Logging level (optional, default: info)

use retailflow::aggregator_core::{BackendType, BundleWriter};
use retailflow::pipeline::{AggregationConfig, IngestionRun};
use std::env;
use std::path::PathBuf;

fn parse_backend_from_args() -> BackendType {
    let args: Vec<String> = env::args().collect();
    if let Some(idx) = args.iter().position(|x| x == "--backend") {
        if let Some(backend) = args.get(idx + 1).and_then(|s| BackendType::from_str(s)) {
            return backend;
        }
    }
    BackendType::Json
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let backend = parse_backend_from_args();
    let input_path: PathBuf = env::var("RETAILFLOW_INPUT_PATH")
        .unwrap_or_else(|_| "data/records.jsonl".to_string())
        .into();
    let output_path: PathBuf = env::var("RETAILFLOW_OUTPUT_PATH")
        .unwrap_or_else(|_| match backend {
            BackendType::Json => "data/bundle.json".to_string(),
            BackendType::Sqlite => "data/retailflow.db".to_string(),
        })
        .into();

    let config = AggregationConfig::from_env();

    log::info!("🚀 Starting retailflow aggregation run");
    log::info!("   Input: {}", input_path.display());
    log::info!("   Output: {}", output_path.display());
    log::info!("   Categories: {:?}", config.categories);
    log::info!(
        "   Stock-age buckets: fresh <= {}d, normal <= {}d",
        config.stock_age.fresh_max_days,
        config.stock_age.normal_max_days
    );
    log::info!("   Top brands per category: {}", config.top_brands_limit);
    log::info!("   Reject policy: {:?}", config.reject_policy);

    let mut writer = BundleWriter::new(backend, output_path)?;
    log::info!("📊 Backend: {}", writer.backend_type());

    let run = IngestionRun::new(config)?;
    let bundle = run.execute_file(&input_path)?;

    writer.write_bundle(&bundle).await?;
    writer.flush().await?;

    log::info!(
        "✅ Bundle published: schema v{}, {} records ({} rejected)",
        bundle.meta.schema_version,
        bundle.meta.source_records,
        bundle.meta.rejected_records
    );
    for (name, value) in &bundle.kpis {
        log::info!("   {}: {}", name, value);
    }

    Ok(())
}
