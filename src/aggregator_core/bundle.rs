//! Immutable bundle snapshot assembly
//!
//! A `Bundle` is the only thing downstream consumers ever see: one
//! versioned, fully consistent snapshot of all KPI scalars and aggregate
//! tables from a single ingestion run. It is constructed once, after the
//! whole pass has succeeded, and never mutated; the next run supersedes it
//! wholesale.

use super::engine::{ConfigurationError, FinalizedTables, GroupKey, StockAgeThresholds};
use super::kpi::KpiSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bundle schema version. Adding a field is backward compatible; renaming or
/// removing one bumps this.
pub const SCHEMA_VERSION: u32 = 1;

/// Grouping ids, doubling as the bundle's table names
pub mod tables {
    pub const CATEGORIES: &str = "categories";
    pub const MONTHLY_TRENDS: &str = "monthlyTrends";
    pub const STOCK_AGEING: &str = "stockAgeing";
    pub const POS_DATA: &str = "posData";
    pub const SUB_CATEGORIES: &str = "subCategories";
    pub const TOP_BRANDS: &str = "topBrands";
    pub const MARGIN_ANALYSIS: &str = "marginAnalysis";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdsMeta {
    #[serde(rename = "freshMaxDays")]
    pub fresh_max_days: f64,
    #[serde(rename = "normalMaxDays")]
    pub normal_max_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundleMeta {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    #[serde(rename = "sourceRecords")]
    pub source_records: u64,
    #[serde(rename = "rejectedRecords")]
    pub rejected_records: u64,
    #[serde(rename = "stockAgeThresholds")]
    pub stock_age_thresholds: ThresholdsMeta,
    #[serde(rename = "topBrandsLimit")]
    pub top_brands_limit: u64,
    /// Basis for the Fresh/Ageing stock share KPIs: always "transactions"
    #[serde(rename = "stockShareBasis")]
    pub stock_share_basis: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRow {
    pub name: String,
    pub transactions: u64,
    pub revenue: f64,
    #[serde(rename = "avgRevenue")]
    pub avg_revenue: Option<f64>,
    pub profit: f64,
    pub margin: Option<f64>,
    pub quantity: u64,
    pub skus: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthlyTrendRow {
    pub month: String,
    pub category: String,
    pub transactions: u64,
    pub revenue: f64,
    pub profit: f64,
    pub quantity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockAgeingRow {
    pub category: String,
    pub transactions: u64,
    pub revenue: f64,
    pub quantity: u64,
    #[serde(rename = "avgAge")]
    pub avg_age: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PosRow {
    pub pos: String,
    pub store: String,
    pub transactions: u64,
    pub revenue: f64,
    pub profit: f64,
    pub margin: Option<f64>,
    pub quantity: u64,
    pub skus: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubCategoryRow {
    pub category: String,
    #[serde(rename = "subCategory")]
    pub sub_category: String,
    pub transactions: u64,
    pub revenue: f64,
    #[serde(rename = "avgRevenue")]
    pub avg_revenue: Option<f64>,
    pub profit: f64,
    pub margin: Option<f64>,
    pub quantity: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandRow {
    pub category: String,
    pub brand: String,
    pub transactions: u64,
    pub revenue: f64,
    pub profit: f64,
    pub margin: Option<f64>,
    pub skus: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarginRow {
    pub category: String,
    #[serde(rename = "subCategory")]
    pub sub_category: String,
    #[serde(rename = "avgMargin")]
    pub avg_margin: Option<f64>,
    #[serde(rename = "minMargin")]
    pub min_margin: Option<f64>,
    #[serde(rename = "maxMargin")]
    pub max_margin: Option<f64>,
    pub profit: f64,
    pub revenue: f64,
}

/// The finalized snapshot. Immutable by construction: no mutating methods,
/// and the pipeline only ever hands out owned or shared references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bundle {
    pub meta: BundleMeta,
    pub kpis: BTreeMap<String, String>,
    pub categories: Vec<CategoryRow>,
    #[serde(rename = "monthlyTrends")]
    pub monthly_trends: Vec<MonthlyTrendRow>,
    #[serde(rename = "stockAgeing")]
    pub stock_ageing: Vec<StockAgeingRow>,
    #[serde(rename = "posData")]
    pub pos_data: Vec<PosRow>,
    #[serde(rename = "subCategories")]
    pub sub_categories: Vec<SubCategoryRow>,
    #[serde(rename = "topBrands")]
    pub top_brands: Vec<BrandRow>,
    #[serde(rename = "marginAnalysis")]
    pub margin_analysis: Vec<MarginRow>,
}

/// Composes finalized tables and KPI scalars into a `Bundle`.
///
/// The builder runs strictly after a successful pass; failures upstream
/// discard all intermediate state, so a partially aggregated snapshot can
/// never be published.
pub struct BundleBuilder {
    currency: String,
    thresholds: StockAgeThresholds,
    top_brands_limit: usize,
    clock: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl BundleBuilder {
    pub fn new(currency: String, thresholds: StockAgeThresholds, top_brands_limit: usize) -> Self {
        Self::new_with_clock(currency, thresholds, top_brands_limit, Box::new(Utc::now))
    }

    /// Clock injection keeps the determinism tests honest
    pub fn new_with_clock(
        currency: String,
        thresholds: StockAgeThresholds,
        top_brands_limit: usize,
        clock: Box<dyn Fn() -> DateTime<Utc> + Send + Sync>,
    ) -> Self {
        Self {
            currency,
            thresholds,
            top_brands_limit,
            clock,
        }
    }

    pub fn build(
        &self,
        mut finalized: FinalizedTables,
        snapshot: KpiSnapshot,
        source_records: u64,
        rejected_records: u64,
    ) -> Result<Bundle, ConfigurationError> {
        let categories = build_categories(finalized.take(tables::CATEGORIES)?)?;
        let monthly_trends = build_monthly_trends(finalized.take(tables::MONTHLY_TRENDS)?)?;
        let stock_ageing = build_stock_ageing(finalized.take(tables::STOCK_AGEING)?)?;
        let pos_data = build_pos_data(finalized.take(tables::POS_DATA)?)?;
        let sub_categories = build_sub_categories(finalized.take(tables::SUB_CATEGORIES)?)?;
        let top_brands = build_top_brands(finalized.take(tables::TOP_BRANDS)?)?;
        let margin_analysis = build_margin_analysis(finalized.take(tables::MARGIN_ANALYSIS)?)?;

        let meta = BundleMeta {
            schema_version: SCHEMA_VERSION,
            generated_at: (self.clock)().to_rfc3339(),
            source_records,
            rejected_records,
            stock_age_thresholds: ThresholdsMeta {
                fresh_max_days: self.thresholds.fresh_max_days,
                normal_max_days: self.thresholds.normal_max_days,
            },
            top_brands_limit: self.top_brands_limit as u64,
            stock_share_basis: "transactions".to_string(),
            currency: self.currency.clone(),
        };

        Ok(Bundle {
            meta,
            kpis: snapshot.to_kpis(&self.currency),
            categories,
            monthly_trends,
            stock_ageing,
            pos_data,
            sub_categories,
            top_brands,
            margin_analysis,
        })
    }
}

fn build_categories(
    rows: Vec<super::engine::AggregateRow>,
) -> Result<Vec<CategoryRow>, ConfigurationError> {
    rows.into_iter()
        .map(|row| match row.key.clone() {
            GroupKey::Category(name) => Ok(CategoryRow {
                name,
                transactions: row.transactions,
                revenue: row.revenue,
                avg_revenue: row.avg_revenue,
                profit: row.profit,
                margin: row.margin,
                quantity: row.quantity,
                skus: row.skus,
            }),
            _ => Err(mismatch(tables::CATEGORIES)),
        })
        .collect()
}

fn build_monthly_trends(
    rows: Vec<super::engine::AggregateRow>,
) -> Result<Vec<MonthlyTrendRow>, ConfigurationError> {
    rows.into_iter()
        .map(|row| match row.key.clone() {
            GroupKey::MonthCategory(month, category) => Ok(MonthlyTrendRow {
                month,
                category,
                transactions: row.transactions,
                revenue: row.revenue,
                profit: row.profit,
                quantity: row.quantity,
            }),
            _ => Err(mismatch(tables::MONTHLY_TRENDS)),
        })
        .collect()
}

fn build_stock_ageing(
    rows: Vec<super::engine::AggregateRow>,
) -> Result<Vec<StockAgeingRow>, ConfigurationError> {
    rows.into_iter()
        .map(|row| match row.key.clone() {
            GroupKey::StockAge(category) => Ok(StockAgeingRow {
                category,
                transactions: row.transactions,
                revenue: row.revenue,
                quantity: row.quantity,
                avg_age: row.avg_age,
            }),
            _ => Err(mismatch(tables::STOCK_AGEING)),
        })
        .collect()
}

fn build_pos_data(
    rows: Vec<super::engine::AggregateRow>,
) -> Result<Vec<PosRow>, ConfigurationError> {
    rows.into_iter()
        .map(|row| match row.key.clone() {
            GroupKey::PosStore(pos, store) => Ok(PosRow {
                pos,
                store,
                transactions: row.transactions,
                revenue: row.revenue,
                profit: row.profit,
                margin: row.margin,
                quantity: row.quantity,
                skus: row.skus,
            }),
            _ => Err(mismatch(tables::POS_DATA)),
        })
        .collect()
}

fn build_sub_categories(
    rows: Vec<super::engine::AggregateRow>,
) -> Result<Vec<SubCategoryRow>, ConfigurationError> {
    rows.into_iter()
        .map(|row| match row.key.clone() {
            GroupKey::CategorySubCategory(category, sub_category) => Ok(SubCategoryRow {
                category,
                sub_category,
                transactions: row.transactions,
                revenue: row.revenue,
                avg_revenue: row.avg_revenue,
                profit: row.profit,
                margin: row.margin,
                quantity: row.quantity,
            }),
            _ => Err(mismatch(tables::SUB_CATEGORIES)),
        })
        .collect()
}

fn build_top_brands(
    rows: Vec<super::engine::AggregateRow>,
) -> Result<Vec<BrandRow>, ConfigurationError> {
    rows.into_iter()
        .map(|row| match row.key.clone() {
            GroupKey::CategoryBrand(category, brand) => Ok(BrandRow {
                category,
                brand,
                transactions: row.transactions,
                revenue: row.revenue,
                profit: row.profit,
                margin: row.margin,
                skus: row.skus,
            }),
            _ => Err(mismatch(tables::TOP_BRANDS)),
        })
        .collect()
}

fn build_margin_analysis(
    rows: Vec<super::engine::AggregateRow>,
) -> Result<Vec<MarginRow>, ConfigurationError> {
    rows.into_iter()
        .map(|row| match row.key.clone() {
            GroupKey::CategorySubCategory(category, sub_category) => Ok(MarginRow {
                category,
                sub_category,
                avg_margin: row.margin,
                min_margin: row.margin_min,
                max_margin: row.margin_max,
                profit: row.profit,
                revenue: row.revenue,
            }),
            _ => Err(mismatch(tables::MARGIN_ANALYSIS)),
        })
        .collect()
}

fn mismatch(id: &str) -> ConfigurationError {
    ConfigurationError::GroupingMismatch { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator_core::engine::{AggregationEngine, GroupKey};
    use crate::aggregator_core::kpi::KpiSummarizer;
    use crate::aggregator_core::normalizer::TransactionRecord;
    use chrono::{NaiveDate, TimeZone};

    fn make_record(category: &str, sub: &str, revenue: f64, profit: f64) -> TransactionRecord {
        TransactionRecord {
            sku: format!("{}-{}-{}", category, sub, revenue),
            category: category.to_string(),
            sub_category: sub.to_string(),
            brand: "BrandF1".to_string(),
            pos: "POS1".to_string(),
            store: "Store_A".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            month: "2024-03".to_string(),
            quantity: 1,
            revenue,
            profit,
            stock_age_days: 10.0,
        }
    }

    fn standard_engine(thresholds: StockAgeThresholds) -> AggregationEngine {
        let mut engine = AggregationEngine::new();
        engine
            .register(tables::CATEGORIES, Box::new(|r: &TransactionRecord| {
                GroupKey::Category(r.category.clone())
            }))
            .unwrap();
        engine
            .register(tables::MONTHLY_TRENDS, Box::new(|r: &TransactionRecord| {
                GroupKey::MonthCategory(r.month.clone(), r.category.clone())
            }))
            .unwrap();
        engine
            .register(
                tables::STOCK_AGEING,
                Box::new(move |r: &TransactionRecord| {
                    GroupKey::StockAge(thresholds.bucket(r.stock_age_days).to_string())
                }),
            )
            .unwrap();
        engine
            .register(tables::POS_DATA, Box::new(|r: &TransactionRecord| {
                GroupKey::PosStore(r.pos.clone(), r.store.clone())
            }))
            .unwrap();
        engine
            .register(tables::SUB_CATEGORIES, Box::new(|r: &TransactionRecord| {
                GroupKey::CategorySubCategory(r.category.clone(), r.sub_category.clone())
            }))
            .unwrap();
        engine
            .register_top_by_revenue(
                tables::TOP_BRANDS,
                Box::new(|r: &TransactionRecord| {
                    GroupKey::CategoryBrand(r.category.clone(), r.brand.clone())
                }),
                10,
            )
            .unwrap();
        engine
            .register(tables::MARGIN_ANALYSIS, Box::new(|r: &TransactionRecord| {
                GroupKey::CategorySubCategory(r.category.clone(), r.sub_category.clone())
            }))
            .unwrap();
        engine
    }

    fn fixed_clock_builder() -> BundleBuilder {
        BundleBuilder::new_with_clock(
            "INR".to_string(),
            StockAgeThresholds::default(),
            10,
            Box::new(|| Utc.with_ymd_and_hms(2024, 12, 31, 12, 0, 0).unwrap()),
        )
    }

    #[test]
    fn test_build_full_bundle() {
        let thresholds = StockAgeThresholds::default();
        let mut engine = standard_engine(thresholds);
        let mut kpi = KpiSummarizer::new(thresholds);

        for record in [
            make_record("Fashion", "Women", 100.0, 45.0),
            make_record("Fashion", "Men", 50.0, 20.0),
            make_record("Grocery", "Dairy", 30.0, 3.0),
        ] {
            engine.ingest(&record);
            kpi.ingest(&record);
        }

        let bundle = fixed_clock_builder()
            .build(engine.finalize(), kpi.finalize(), 3, 0)
            .unwrap();

        assert_eq!(bundle.meta.schema_version, SCHEMA_VERSION);
        assert_eq!(bundle.meta.source_records, 3);
        assert_eq!(bundle.meta.stock_share_basis, "transactions");
        assert_eq!(bundle.categories.len(), 2);
        assert_eq!(bundle.categories[0].name, "Fashion");
        assert_eq!(bundle.categories[0].revenue, 150.0);
        assert_eq!(bundle.sub_categories.len(), 3);
        assert_eq!(bundle.top_brands.len(), 2);
        assert_eq!(bundle.margin_analysis.len(), 3);
        assert_eq!(bundle.kpis["Total Transactions"], "3");
    }

    #[test]
    fn test_serialized_field_names_are_stable() {
        let thresholds = StockAgeThresholds::default();
        let mut engine = standard_engine(thresholds);
        let mut kpi = KpiSummarizer::new(thresholds);
        let record = make_record("Fashion", "Women", 100.0, 45.0);
        engine.ingest(&record);
        kpi.ingest(&record);

        let bundle = fixed_clock_builder()
            .build(engine.finalize(), kpi.finalize(), 1, 0)
            .unwrap();
        let value = serde_json::to_value(&bundle).unwrap();

        assert!(value.get("monthlyTrends").is_some());
        assert!(value.get("stockAgeing").is_some());
        assert!(value.get("posData").is_some());
        assert!(value.get("subCategories").is_some());
        assert!(value.get("topBrands").is_some());
        assert!(value.get("marginAnalysis").is_some());
        assert!(value["categories"][0].get("avgRevenue").is_some());
        assert!(value["marginAnalysis"][0].get("avgMargin").is_some());
        assert_eq!(value["meta"]["schemaVersion"], 1);
        assert_eq!(value["meta"]["stockAgeThresholds"]["freshMaxDays"], 30.0);
    }

    #[test]
    fn test_zero_revenue_serializes_as_null_not_nan() {
        let thresholds = StockAgeThresholds::default();
        let mut engine = standard_engine(thresholds);
        let mut kpi = KpiSummarizer::new(thresholds);
        let record = make_record("Fashion", "Women", 0.0, 0.0);
        engine.ingest(&record);
        kpi.ingest(&record);

        let bundle = fixed_clock_builder()
            .build(engine.finalize(), kpi.finalize(), 1, 0)
            .unwrap();
        let json = serde_json::to_string(&bundle).unwrap();

        assert!(!json.contains("NaN"));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["categories"][0]["margin"].is_null());
        assert!(value["marginAnalysis"][0]["avgMargin"].is_null());
    }

    #[test]
    fn test_missing_table_is_configuration_error() {
        let mut engine = AggregationEngine::new();
        engine
            .register(tables::CATEGORIES, Box::new(|r: &TransactionRecord| {
                GroupKey::Category(r.category.clone())
            }))
            .unwrap();
        let kpi = KpiSummarizer::new(StockAgeThresholds::default());

        let err = fixed_clock_builder()
            .build(engine.finalize(), kpi.finalize(), 0, 0)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownGrouping { .. }));
    }
}
