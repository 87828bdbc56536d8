//! One ingestion run: records in, immutable bundle out
//!
//! A run is a synchronous, single-threaded streaming fold. Every record goes
//! through the normalizer and then into both the aggregation engine and the
//! KPI summarizer in the same pass. A cooperative abort flag is checked
//! between records. Any failure before finalize discards all intermediate
//! state — a partially aggregated bundle is never published.

use super::config::{AggregationConfig, RejectPolicy};
use crate::aggregator_core::bundle::{tables, Bundle, BundleBuilder};
use crate::aggregator_core::engine::{
    AggregationEngine, ConfigurationError, GroupKey, StockAgeThresholds,
};
use crate::aggregator_core::kpi::KpiSummarizer;
use crate::aggregator_core::normalizer::{
    RawRecord, RecordNormalizer, TransactionRecord, ValidationError,
};
use crate::aggregator_core::reader::RecordFileReader;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug)]
pub enum IngestError {
    Validation(ValidationError),
    RejectionThresholdExceeded { rejected: u64, limit: u64 },
    Configuration(ConfigurationError),
    Aborted { processed: u64 },
    Io(std::io::Error),
}

impl From<ConfigurationError> for IngestError {
    fn from(err: ConfigurationError) -> Self {
        IngestError::Configuration(err)
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::Io(err)
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Validation(e) => write!(f, "invalid record: {}", e),
            IngestError::RejectionThresholdExceeded { rejected, limit } => write!(
                f,
                "rejected {} records, exceeding the limit of {}",
                rejected, limit
            ),
            IngestError::Configuration(e) => write!(f, "configuration error: {}", e),
            IngestError::Aborted { processed } => {
                write!(f, "run aborted after {} records", processed)
            }
            IngestError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for IngestError {}

/// Register the standard grouping set every bundle is built from
pub fn standard_engine(
    thresholds: StockAgeThresholds,
    top_brands_limit: usize,
) -> Result<AggregationEngine, ConfigurationError> {
    let mut engine = AggregationEngine::new();
    engine.register(tables::CATEGORIES, Box::new(|r: &TransactionRecord| {
        GroupKey::Category(r.category.clone())
    }))?;
    engine.register(tables::MONTHLY_TRENDS, Box::new(|r: &TransactionRecord| {
        GroupKey::MonthCategory(r.month.clone(), r.category.clone())
    }))?;
    engine.register(
        tables::STOCK_AGEING,
        Box::new(move |r: &TransactionRecord| {
            GroupKey::StockAge(thresholds.bucket(r.stock_age_days).to_string())
        }),
    )?;
    engine.register(tables::POS_DATA, Box::new(|r: &TransactionRecord| {
        GroupKey::PosStore(r.pos.clone(), r.store.clone())
    }))?;
    engine.register(tables::SUB_CATEGORIES, Box::new(|r: &TransactionRecord| {
        GroupKey::CategorySubCategory(r.category.clone(), r.sub_category.clone())
    }))?;
    engine.register_top_by_revenue(
        tables::TOP_BRANDS,
        Box::new(|r: &TransactionRecord| {
            GroupKey::CategoryBrand(r.category.clone(), r.brand.clone())
        }),
        top_brands_limit,
    )?;
    engine.register(tables::MARGIN_ANALYSIS, Box::new(|r: &TransactionRecord| {
        GroupKey::CategorySubCategory(r.category.clone(), r.sub_category.clone())
    }))?;
    Ok(engine)
}

/// One ingestion run over a finite record stream.
///
/// Concurrent runs are independent: each owns its engine, summarizer, and
/// builder, and they share no mutable state. The returned `Bundle` is
/// immutable and safe to share across readers.
pub struct IngestionRun {
    config: AggregationConfig,
    abort: Option<Arc<AtomicBool>>,
}

impl IngestionRun {
    /// Validate configuration up front; nothing is read before this passes
    pub fn new(config: AggregationConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            config,
            abort: None,
        })
    }

    /// Install a cooperative abort flag, checked between records
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    /// Run the full pass over a JSONL record file
    pub fn execute_file(self, path: impl AsRef<Path>) -> Result<Bundle, IngestError> {
        let reader = RecordFileReader::open(path)?;
        self.execute(reader.records())
    }

    /// Run the full pass over an iterable of raw records
    pub fn execute<I>(self, records: I) -> Result<Bundle, IngestError>
    where
        I: IntoIterator<Item = Result<RawRecord, ValidationError>>,
    {
        let started = Instant::now();

        let normalizer = RecordNormalizer::new(
            self.config.categories.clone(),
            self.config.unknown_category_policy,
        );
        let mut engine = standard_engine(self.config.stock_age, self.config.top_brands_limit)?;
        let mut summarizer = KpiSummarizer::new(self.config.stock_age);

        let mut accepted: u64 = 0;
        let mut rejected: u64 = 0;

        for raw in records {
            if let Some(flag) = &self.abort {
                if flag.load(Ordering::Relaxed) {
                    log::warn!("🛑 Abort requested, discarding run after {} records", accepted);
                    return Err(IngestError::Aborted {
                        processed: accepted,
                    });
                }
            }

            let record = match raw.and_then(|r| normalizer.normalize(r)) {
                Ok(record) => record,
                Err(e) => {
                    rejected += 1;
                    match self.config.reject_policy {
                        RejectPolicy::Abort => {
                            log::error!("Rejecting run on invalid record: {}", e);
                            return Err(IngestError::Validation(e));
                        }
                        RejectPolicy::SkipAndCount { max_rejected } => {
                            log::warn!("Skipping invalid record: {}", e);
                            if rejected > max_rejected {
                                return Err(IngestError::RejectionThresholdExceeded {
                                    rejected,
                                    limit: max_rejected,
                                });
                            }
                            continue;
                        }
                    }
                }
            };

            engine.ingest(&record);
            summarizer.ingest(&record);
            accepted += 1;
        }

        let builder = BundleBuilder::new(
            self.config.currency.clone(),
            self.config.stock_age,
            self.config.top_brands_limit,
        );
        let bundle = builder.build(engine.finalize(), summarizer.finalize(), accepted, rejected)?;

        log::info!(
            "✅ Ingestion complete: {} accepted, {} rejected in {:.2?}",
            accepted,
            rejected,
            started.elapsed()
        );

        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(sku: &str, category: &str, revenue: f64, profit: f64) -> Result<RawRecord, ValidationError> {
        Ok(RawRecord {
            sku: sku.to_string(),
            category: category.to_string(),
            sub_category: "Women".to_string(),
            brand: "BrandF1".to_string(),
            pos: "POS1".to_string(),
            store: "Store_A".to_string(),
            date: "2024-03-15".to_string(),
            quantity: 2,
            revenue,
            profit,
            stock_age_days: 45.0,
        })
    }

    fn bad_record() -> Result<RawRecord, ValidationError> {
        let mut record = raw("BAD", "Fashion", 10.0, 1.0).unwrap();
        record.quantity = -5;
        Ok(record)
    }

    #[test]
    fn test_run_produces_bundle() {
        let run = IngestionRun::new(AggregationConfig::default()).unwrap();
        let bundle = run
            .execute(vec![
                raw("S1", "Fashion", 100.0, 45.0),
                raw("S2", "Fashion", 50.0, 20.0),
            ])
            .unwrap();

        assert_eq!(bundle.meta.source_records, 2);
        assert_eq!(bundle.meta.rejected_records, 0);
        assert_eq!(bundle.categories.len(), 1);
        let fashion = &bundle.categories[0];
        assert_eq!(fashion.transactions, 2);
        assert_eq!(fashion.revenue, 150.0);
        assert_eq!(fashion.profit, 65.0);
        assert!((fashion.margin.unwrap() - 43.333333333333336).abs() < 1e-6);
        assert_eq!(fashion.avg_revenue, Some(75.0));
    }

    #[test]
    fn test_skip_and_count_reports_rejects() {
        let run = IngestionRun::new(AggregationConfig::default()).unwrap();
        let bundle = run
            .execute(vec![raw("S1", "Fashion", 100.0, 45.0), bad_record()])
            .unwrap();

        assert_eq!(bundle.meta.source_records, 1);
        assert_eq!(bundle.meta.rejected_records, 1);
    }

    #[test]
    fn test_rejection_threshold_aborts() {
        let mut config = AggregationConfig::default();
        config.reject_policy = RejectPolicy::SkipAndCount { max_rejected: 1 };
        let run = IngestionRun::new(config).unwrap();

        let err = run
            .execute(vec![bad_record(), bad_record()])
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::RejectionThresholdExceeded {
                rejected: 2,
                limit: 1
            }
        ));
    }

    #[test]
    fn test_abort_policy_fails_on_first_reject() {
        let mut config = AggregationConfig::default();
        config.reject_policy = RejectPolicy::Abort;
        let run = IngestionRun::new(config).unwrap();

        let err = run
            .execute(vec![raw("S1", "Fashion", 100.0, 45.0), bad_record()])
            .unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn test_abort_flag_discards_run() {
        let flag = Arc::new(AtomicBool::new(true));
        let run = IngestionRun::new(AggregationConfig::default())
            .unwrap()
            .with_abort_flag(flag);

        let err = run.execute(vec![raw("S1", "Fashion", 100.0, 45.0)]).unwrap_err();
        assert!(matches!(err, IngestError::Aborted { processed: 0 }));
    }

    #[test]
    fn test_invalid_config_fails_before_ingestion() {
        let mut config = AggregationConfig::default();
        config.top_brands_limit = 0;
        assert!(IngestionRun::new(config).is_err());
    }

    #[test]
    fn test_kpi_totals_match_category_table() {
        let run = IngestionRun::new(AggregationConfig::default()).unwrap();
        let bundle = run
            .execute(vec![
                raw("S1", "Fashion", 100.0, 45.0),
                raw("S2", "Grocery", 50.0, 5.0),
                raw("S3", "Grocery", 25.0, 2.0),
            ])
            .unwrap();

        let table_transactions: u64 = bundle.categories.iter().map(|c| c.transactions).sum();
        let table_revenue: f64 = bundle.categories.iter().map(|c| c.revenue).sum();

        assert_eq!(bundle.kpis["Total Transactions"], table_transactions.to_string());
        assert_eq!(bundle.kpis["Total Revenue (INR)"], "175.00");
        assert!((table_revenue - 175.0).abs() < 1e-9);
        assert_eq!(bundle.kpis["Grocery Revenue (INR)"], "75.00");
    }
}
