//! Streaming aggregation engine over registered groupings

use super::normalizer::TransactionRecord;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Fatal setup failure, raised before any ingestion begins (or at
/// finalize-time table lookup). Never used for row-level problems.
#[derive(Debug)]
pub enum ConfigurationError {
    InvalidStockAgeThresholds { fresh: f64, normal: f64 },
    InvalidTopLimit { grouping: String },
    DuplicateGrouping { id: String },
    UnknownGrouping { id: String },
    GroupingMismatch { id: String },
    EmptyCategoryVocabulary,
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::InvalidStockAgeThresholds { fresh, normal } => write!(
                f,
                "invalid stock age thresholds: fresh={} normal={} (need 0 < fresh < normal)",
                fresh, normal
            ),
            ConfigurationError::InvalidTopLimit { grouping } => {
                write!(f, "top limit must be > 0 for grouping '{}'", grouping)
            }
            ConfigurationError::DuplicateGrouping { id } => {
                write!(f, "grouping '{}' registered twice", id)
            }
            ConfigurationError::UnknownGrouping { id } => {
                write!(f, "grouping '{}' was never registered", id)
            }
            ConfigurationError::GroupingMismatch { id } => {
                write!(f, "grouping '{}' differs between merged engines", id)
            }
            ConfigurationError::EmptyCategoryVocabulary => {
                write!(f, "category vocabulary must not be empty")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

pub const FRESH_BUCKET: &str = "Fresh";
pub const NORMAL_BUCKET: &str = "Normal";
pub const AGEING_BUCKET: &str = "Ageing";

/// Boundary policy for stock-age bucketing. The thresholds are configuration,
/// not constants, and are echoed into bundle metadata so downstream legends
/// stay in sync with the data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockAgeThresholds {
    /// Inclusive upper bound for the Fresh bucket, in days
    pub fresh_max_days: f64,
    /// Inclusive upper bound for the Normal bucket, in days
    pub normal_max_days: f64,
}

impl Default for StockAgeThresholds {
    fn default() -> Self {
        Self {
            fresh_max_days: 30.0,
            normal_max_days: 90.0,
        }
    }
}

impl StockAgeThresholds {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.fresh_max_days <= 0.0
            || self.normal_max_days <= self.fresh_max_days
            || !self.fresh_max_days.is_finite()
            || !self.normal_max_days.is_finite()
        {
            return Err(ConfigurationError::InvalidStockAgeThresholds {
                fresh: self.fresh_max_days,
                normal: self.normal_max_days,
            });
        }
        Ok(())
    }

    pub fn bucket(&self, age_days: f64) -> &'static str {
        if age_days <= self.fresh_max_days {
            FRESH_BUCKET
        } else if age_days <= self.normal_max_days {
            NORMAL_BUCKET
        } else {
            AGEING_BUCKET
        }
    }
}

/// Group key for a registered grouping. `Ord` drives both the emitted row
/// order and the stable tie-break in top-N selection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKey {
    Category(String),
    MonthCategory(String, String),
    CategorySubCategory(String, String),
    PosStore(String, String),
    CategoryBrand(String, String),
    StockAge(String),
}

impl GroupKey {
    /// Leading key component: the partition within which top-N selection runs
    pub fn leading(&self) -> &str {
        match self {
            GroupKey::Category(a)
            | GroupKey::MonthCategory(a, _)
            | GroupKey::CategorySubCategory(a, _)
            | GroupKey::PosStore(a, _)
            | GroupKey::CategoryBrand(a, _)
            | GroupKey::StockAge(a) => a,
        }
    }
}

/// Running sums for one group. Everything here is commutative and
/// associative, so partial accumulators from disjoint record sets can be
/// merged in any order before finalize.
#[derive(Debug, Clone, Default)]
pub struct GroupAccumulator {
    pub transactions: u64,
    pub revenue: f64,
    pub profit: f64,
    pub quantity: u64,
    pub age_days_sum: f64,
    pub margin_min: Option<f64>,
    pub margin_max: Option<f64>,
    pub skus: HashSet<String>,
}

impl GroupAccumulator {
    pub fn add(&mut self, record: &TransactionRecord) {
        self.transactions += 1;
        self.revenue += record.revenue;
        self.profit += record.profit;
        self.quantity += record.quantity;
        self.age_days_sum += record.stock_age_days;
        if let Some(margin) = record.margin() {
            self.margin_min = Some(match self.margin_min {
                Some(current) => current.min(margin),
                None => margin,
            });
            self.margin_max = Some(match self.margin_max {
                Some(current) => current.max(margin),
                None => margin,
            });
        }
        self.skus.insert(record.sku.clone());
    }

    pub fn merge(&mut self, other: GroupAccumulator) {
        self.transactions += other.transactions;
        self.revenue += other.revenue;
        self.profit += other.profit;
        self.quantity += other.quantity;
        self.age_days_sum += other.age_days_sum;
        self.margin_min = match (self.margin_min, other.margin_min) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        self.margin_max = match (self.margin_max, other.margin_max) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.skus.extend(other.skus);
    }
}

/// One finalized row per group key. Derived fields are computed from the
/// final sums only, never from running averages, and division by zero is a
/// `None` sentinel rather than NaN.
#[derive(Debug, Clone)]
pub struct AggregateRow {
    pub key: GroupKey,
    pub transactions: u64,
    pub revenue: f64,
    pub profit: f64,
    pub quantity: u64,
    pub skus: u64,
    pub avg_revenue: Option<f64>,
    pub margin: Option<f64>,
    pub avg_age: Option<f64>,
    pub margin_min: Option<f64>,
    pub margin_max: Option<f64>,
}

pub type KeyFn = Box<dyn Fn(&TransactionRecord) -> GroupKey + Send + Sync>;

struct RegisteredGrouping {
    id: String,
    key_fn: KeyFn,
    top_limit: Option<usize>,
    groups: BTreeMap<GroupKey, GroupAccumulator>,
}

/// Streaming aggregation over a set of registered groupings.
///
/// One pass over the record stream updates every grouping's accumulator;
/// memory stays proportional to the number of distinct group keys plus the
/// distinct SKUs seen per group.
#[derive(Default)]
pub struct AggregationEngine {
    groupings: Vec<RegisteredGrouping>,
}

impl AggregationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a grouping before ingestion starts
    pub fn register(
        &mut self,
        id: impl Into<String>,
        key_fn: KeyFn,
    ) -> Result<(), ConfigurationError> {
        self.register_inner(id.into(), key_fn, None)
    }

    /// Declare a grouping whose finalized rows keep only the top `limit`
    /// entries by revenue within each distinct leading key component
    pub fn register_top_by_revenue(
        &mut self,
        id: impl Into<String>,
        key_fn: KeyFn,
        limit: usize,
    ) -> Result<(), ConfigurationError> {
        let id = id.into();
        if limit == 0 {
            return Err(ConfigurationError::InvalidTopLimit { grouping: id });
        }
        self.register_inner(id, key_fn, Some(limit))
    }

    fn register_inner(
        &mut self,
        id: String,
        key_fn: KeyFn,
        top_limit: Option<usize>,
    ) -> Result<(), ConfigurationError> {
        if self.groupings.iter().any(|g| g.id == id) {
            return Err(ConfigurationError::DuplicateGrouping { id });
        }
        self.groupings.push(RegisteredGrouping {
            id,
            key_fn,
            top_limit,
            groups: BTreeMap::new(),
        });
        Ok(())
    }

    /// Fold one record into every registered grouping
    pub fn ingest(&mut self, record: &TransactionRecord) {
        for grouping in &mut self.groupings {
            let key = (grouping.key_fn)(record);
            grouping.groups.entry(key).or_default().add(record);
        }
    }

    /// Merge another engine's accumulators into this one.
    ///
    /// Both engines must have been registered identically (same ids in the
    /// same order, same top limits); this is the partition-and-merge path,
    /// where each partition runs the same registration code.
    pub fn merge(&mut self, other: AggregationEngine) -> Result<(), ConfigurationError> {
        if self.groupings.len() != other.groupings.len() {
            let id = other
                .groupings
                .get(self.groupings.len())
                .or_else(|| self.groupings.get(other.groupings.len()))
                .map(|g| g.id.clone())
                .unwrap_or_default();
            return Err(ConfigurationError::GroupingMismatch { id });
        }
        for (mine, theirs) in self.groupings.iter_mut().zip(other.groupings) {
            if mine.id != theirs.id || mine.top_limit != theirs.top_limit {
                return Err(ConfigurationError::GroupingMismatch { id: theirs.id });
            }
            for (key, acc) in theirs.groups {
                mine.groups.entry(key).or_default().merge(acc);
            }
        }
        Ok(())
    }

    /// Emit ordered rows for every grouping, computing derived fields from
    /// the final sums
    pub fn finalize(self) -> FinalizedTables {
        let mut tables = BTreeMap::new();
        for grouping in self.groupings {
            let mut rows: Vec<AggregateRow> = grouping
                .groups
                .into_iter()
                .map(|(key, acc)| finalize_row(key, acc))
                .collect();
            if let Some(limit) = grouping.top_limit {
                rows = apply_top_limit(rows, limit);
            }
            tables.insert(grouping.id, rows);
        }
        FinalizedTables { tables }
    }
}

fn finalize_row(key: GroupKey, acc: GroupAccumulator) -> AggregateRow {
    let avg_revenue = if acc.transactions > 0 {
        Some(acc.revenue / acc.transactions as f64)
    } else {
        None
    };
    let margin = if acc.revenue > 0.0 {
        Some(acc.profit / acc.revenue * 100.0)
    } else {
        None
    };
    let avg_age = if acc.transactions > 0 {
        Some(acc.age_days_sum / acc.transactions as f64)
    } else {
        None
    };

    AggregateRow {
        key,
        transactions: acc.transactions,
        revenue: acc.revenue,
        profit: acc.profit,
        quantity: acc.quantity,
        skus: acc.skus.len() as u64,
        avg_revenue,
        margin,
        avg_age,
        margin_min: acc.margin_min,
        margin_max: acc.margin_max,
    }
}

/// Top-N selection by revenue descending within each leading key component,
/// ties broken by full key ascending. Input rows arrive key-ordered, so each
/// leading component is a contiguous run.
fn apply_top_limit(rows: Vec<AggregateRow>, limit: usize) -> Vec<AggregateRow> {
    let mut out = Vec::with_capacity(rows.len().min(limit));
    let mut rest = rows.as_slice();
    while let Some(first) = rest.first() {
        let lead = first.key.leading();
        let run = rest
            .iter()
            .take_while(|r| r.key.leading() == lead)
            .count();
        let mut chunk: Vec<AggregateRow> = rest[..run].to_vec();
        chunk.sort_by(|a, b| {
            b.revenue
                .partial_cmp(&a.revenue)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        chunk.truncate(limit);
        out.extend(chunk);
        rest = &rest[run..];
    }
    out
}

/// Finalized tables keyed by grouping id
pub struct FinalizedTables {
    tables: BTreeMap<String, Vec<AggregateRow>>,
}

impl FinalizedTables {
    /// Take ownership of one grouping's rows; asking for an id that was
    /// never registered is a configuration bug, not a missing-data case
    pub fn take(&mut self, id: &str) -> Result<Vec<AggregateRow>, ConfigurationError> {
        self.tables
            .remove(id)
            .ok_or_else(|| ConfigurationError::UnknownGrouping { id: id.to_string() })
    }
}
