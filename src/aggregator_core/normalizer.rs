//! Record validation and normalization from JSONL rows to canonical transactions

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Row-level validation failure. One bad row never aborts a run by itself;
/// the pipeline's rejection policy decides what happens next.
#[derive(Debug)]
pub enum ValidationError {
    Parse { line: u64, reason: String },
    EmptyField { field: &'static str },
    NegativeQuantity { quantity: i64 },
    NegativeStockAge { age_days: f64 },
    BadDate { raw: String },
    UnknownCategory { raw: String },
    NonFiniteAmount { field: &'static str },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Parse { line, reason } => {
                write!(f, "line {}: unparseable record: {}", line, reason)
            }
            ValidationError::EmptyField { field } => write!(f, "empty field: {}", field),
            ValidationError::NegativeQuantity { quantity } => {
                write!(f, "negative quantity: {}", quantity)
            }
            ValidationError::NegativeStockAge { age_days } => {
                write!(f, "negative stock age: {}", age_days)
            }
            ValidationError::BadDate { raw } => write!(f, "unparseable date: {}", raw),
            ValidationError::UnknownCategory { raw } => write!(f, "unknown category: {}", raw),
            ValidationError::NonFiniteAmount { field } => {
                write!(f, "non-finite amount in field: {}", field)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Raw record as it arrives on the wire, one JSON object per line.
/// Field types are loose on purpose; `RecordNormalizer` decides what is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub sku: String,
    pub category: String,
    #[serde(rename = "subCategory")]
    pub sub_category: String,
    pub brand: String,
    pub pos: String,
    pub store: String,
    pub date: String,
    pub quantity: i64,
    pub revenue: f64,
    pub profit: f64,
    #[serde(rename = "stockAgeDays")]
    pub stock_age_days: f64,
}

impl RawRecord {
    /// Parse a raw record from a JSONL line
    pub fn from_jsonl(line: &str, line_no: u64) -> Result<Self, ValidationError> {
        serde_json::from_str(line).map_err(|e| ValidationError::Parse {
            line: line_no,
            reason: e.to_string(),
        })
    }
}

/// Canonical transaction record, immutable once built.
///
/// `month` is the year-month truncation of `date` and is derived here so
/// every downstream grouping sees the same formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub sku: String,
    pub category: String,
    pub sub_category: String,
    pub brand: String,
    pub pos: String,
    pub store: String,
    pub date: NaiveDate,
    pub month: String,
    pub quantity: u64,
    pub revenue: f64,
    pub profit: f64,
    pub stock_age_days: f64,
}

impl TransactionRecord {
    /// Per-record margin, defined only when revenue is positive
    pub fn margin(&self) -> Option<f64> {
        if self.revenue > 0.0 {
            Some(self.profit / self.revenue * 100.0)
        } else {
            None
        }
    }
}

/// What to do with a record whose category is not in the vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownCategoryPolicy {
    /// Reject the row (counts against the rejection policy)
    Reject,
    /// Route the row to a catch-all "Other" bucket
    Other,
}

pub const OTHER_CATEGORY: &str = "Other";

/// Validates raw rows and normalizes identifiers into canonical records.
///
/// Category matching is case-insensitive against the configured vocabulary;
/// the canonical spelling from the vocabulary wins. All other identifiers
/// are trimmed verbatim.
pub struct RecordNormalizer {
    vocabulary: Vec<String>,
    unknown_policy: UnknownCategoryPolicy,
}

impl RecordNormalizer {
    pub fn new(vocabulary: Vec<String>, unknown_policy: UnknownCategoryPolicy) -> Self {
        Self {
            vocabulary,
            unknown_policy,
        }
    }

    pub fn normalize(&self, raw: RawRecord) -> Result<TransactionRecord, ValidationError> {
        let sku = required(&raw.sku, "sku")?;
        let sub_category = canonical_case(&required(&raw.sub_category, "subCategory")?);
        let brand = required(&raw.brand, "brand")?;
        let pos = required(&raw.pos, "pos")?;
        let store = required(&raw.store, "store")?;

        if raw.quantity < 0 {
            return Err(ValidationError::NegativeQuantity {
                quantity: raw.quantity,
            });
        }
        if raw.stock_age_days < 0.0 || !raw.stock_age_days.is_finite() {
            return Err(ValidationError::NegativeStockAge {
                age_days: raw.stock_age_days,
            });
        }
        if !raw.revenue.is_finite() {
            return Err(ValidationError::NonFiniteAmount { field: "revenue" });
        }
        if !raw.profit.is_finite() {
            return Err(ValidationError::NonFiniteAmount { field: "profit" });
        }

        let date = NaiveDate::parse_from_str(raw.date.trim(), "%Y-%m-%d").map_err(|_| {
            ValidationError::BadDate {
                raw: raw.date.clone(),
            }
        })?;

        let category = self.normalize_category(&raw.category)?;
        let month = date.format("%Y-%m").to_string();

        Ok(TransactionRecord {
            sku,
            category,
            sub_category,
            brand,
            pos,
            store,
            date,
            month,
            quantity: raw.quantity as u64,
            revenue: raw.revenue,
            profit: raw.profit,
            stock_age_days: raw.stock_age_days,
        })
    }

    fn normalize_category(&self, raw: &str) -> Result<String, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyField { field: "category" });
        }

        for canonical in &self.vocabulary {
            if canonical.eq_ignore_ascii_case(trimmed) {
                return Ok(canonical.clone());
            }
        }

        match self.unknown_policy {
            UnknownCategoryPolicy::Reject => Err(ValidationError::UnknownCategory {
                raw: trimmed.to_string(),
            }),
            UnknownCategoryPolicy::Other => Ok(OTHER_CATEGORY.to_string()),
        }
    }
}

fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(trimmed.to_string())
    }
}

/// Uppercase the leading letter so "women" and "Women" land in one group.
/// Already-canonical identifiers (including acronyms like "FMCG") pass
/// through unchanged.
fn canonical_case(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
