//! Single-pass KPI accumulation over the record stream

use super::engine::StockAgeThresholds;
use super::format::{format_amount, format_count, format_pct};
use super::normalizer::TransactionRecord;
use std::collections::{BTreeMap, HashSet};

/// Scalar accumulator fed in the same streaming pass as the aggregation
/// engine — one pass over the records, not two.
///
/// Fresh/Ageing stock shares are tracked by transaction count, not revenue;
/// the bundle metadata records that choice for downstream legends.
pub struct KpiSummarizer {
    thresholds: StockAgeThresholds,
    transactions: u64,
    revenue: f64,
    profit: f64,
    quantity: u64,
    skus: HashSet<String>,
    stores: HashSet<String>,
    fresh_transactions: u64,
    ageing_transactions: u64,
    revenue_by_category: BTreeMap<String, f64>,
    revenue_by_pos: BTreeMap<String, f64>,
}

impl KpiSummarizer {
    pub fn new(thresholds: StockAgeThresholds) -> Self {
        Self {
            thresholds,
            transactions: 0,
            revenue: 0.0,
            profit: 0.0,
            quantity: 0,
            skus: HashSet::new(),
            stores: HashSet::new(),
            fresh_transactions: 0,
            ageing_transactions: 0,
            revenue_by_category: BTreeMap::new(),
            revenue_by_pos: BTreeMap::new(),
        }
    }

    pub fn ingest(&mut self, record: &TransactionRecord) {
        self.transactions += 1;
        self.revenue += record.revenue;
        self.profit += record.profit;
        self.quantity += record.quantity;
        self.skus.insert(record.sku.clone());
        self.stores.insert(record.store.clone());

        let bucket = self.thresholds.bucket(record.stock_age_days);
        if bucket == super::engine::FRESH_BUCKET {
            self.fresh_transactions += 1;
        } else if bucket == super::engine::AGEING_BUCKET {
            self.ageing_transactions += 1;
        }

        *self
            .revenue_by_category
            .entry(record.category.clone())
            .or_insert(0.0) += record.revenue;
        *self.revenue_by_pos.entry(record.pos.clone()).or_insert(0.0) += record.revenue;
    }

    /// Merge a partial summarizer from a disjoint record partition.
    /// Both sides must have been built with the same thresholds.
    pub fn merge(&mut self, other: KpiSummarizer) {
        self.transactions += other.transactions;
        self.revenue += other.revenue;
        self.profit += other.profit;
        self.quantity += other.quantity;
        self.skus.extend(other.skus);
        self.stores.extend(other.stores);
        self.fresh_transactions += other.fresh_transactions;
        self.ageing_transactions += other.ageing_transactions;
        for (category, revenue) in other.revenue_by_category {
            *self.revenue_by_category.entry(category).or_insert(0.0) += revenue;
        }
        for (pos, revenue) in other.revenue_by_pos {
            *self.revenue_by_pos.entry(pos).or_insert(0.0) += revenue;
        }
    }

    /// Derive the headline scalars from the final sums
    pub fn finalize(self) -> KpiSnapshot {
        let avg_margin = if self.revenue > 0.0 {
            Some(self.profit / self.revenue * 100.0)
        } else {
            None
        };
        let avg_transaction_value = if self.transactions > 0 {
            Some(self.revenue / self.transactions as f64)
        } else {
            None
        };
        let fresh_stock_pct = if self.transactions > 0 {
            Some(self.fresh_transactions as f64 / self.transactions as f64 * 100.0)
        } else {
            None
        };
        let ageing_stock_pct = if self.transactions > 0 {
            Some(self.ageing_transactions as f64 / self.transactions as f64 * 100.0)
        } else {
            None
        };

        KpiSnapshot {
            total_transactions: self.transactions,
            total_revenue: self.revenue,
            total_profit: self.profit,
            avg_margin,
            total_quantity: self.quantity,
            unique_skus: self.skus.len() as u64,
            unique_stores: self.stores.len() as u64,
            fresh_stock_pct,
            ageing_stock_pct,
            avg_transaction_value,
            revenue_by_category: self.revenue_by_category,
            revenue_by_pos: self.revenue_by_pos,
        }
    }
}

/// Finalized headline metrics. The overall average margin is total profit
/// over total revenue, not the mean of per-record margins — the two disagree
/// whenever revenue is unevenly distributed.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiSnapshot {
    pub total_transactions: u64,
    pub total_revenue: f64,
    pub total_profit: f64,
    pub avg_margin: Option<f64>,
    pub total_quantity: u64,
    pub unique_skus: u64,
    pub unique_stores: u64,
    pub fresh_stock_pct: Option<f64>,
    pub ageing_stock_pct: Option<f64>,
    pub avg_transaction_value: Option<f64>,
    pub revenue_by_category: BTreeMap<String, f64>,
    pub revenue_by_pos: BTreeMap<String, f64>,
}

impl KpiSnapshot {
    /// Render the formatted name -> value mapping consumed by dashboards.
    /// Undefined ratios (empty input) render as "n/a" rather than NaN.
    pub fn to_kpis(&self, currency: &str) -> BTreeMap<String, String> {
        let mut kpis = BTreeMap::new();

        kpis.insert(
            "Total Transactions".to_string(),
            format_count(self.total_transactions),
        );
        kpis.insert(
            format!("Total Revenue ({})", currency),
            format_amount(self.total_revenue),
        );
        kpis.insert(
            format!("Total Profit ({})", currency),
            format_amount(self.total_profit),
        );
        kpis.insert(
            "Average Margin (%)".to_string(),
            fmt_opt_pct(self.avg_margin),
        );
        kpis.insert(
            "Total Quantity Sold".to_string(),
            format_count(self.total_quantity),
        );
        kpis.insert("Unique SKUs".to_string(), format_count(self.unique_skus));
        kpis.insert(
            "Unique Stores".to_string(),
            format_count(self.unique_stores),
        );
        kpis.insert(
            "Fresh Stock (%)".to_string(),
            fmt_opt_pct(self.fresh_stock_pct),
        );
        kpis.insert(
            "Ageing Stock (%)".to_string(),
            fmt_opt_pct(self.ageing_stock_pct),
        );
        kpis.insert(
            format!("Average Transaction Value ({})", currency),
            match self.avg_transaction_value {
                Some(value) => format_amount(value),
                None => "n/a".to_string(),
            },
        );

        for (category, revenue) in &self.revenue_by_category {
            kpis.insert(
                format!("{} Revenue ({})", category, currency),
                format_amount(*revenue),
            );
        }
        for (pos, revenue) in &self.revenue_by_pos {
            kpis.insert(
                format!("{} Revenue ({})", pos, currency),
                format_amount(*revenue),
            );
        }

        kpis
    }
}

fn fmt_opt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format_pct(v),
        None => "n/a".to_string(),
    }
}
