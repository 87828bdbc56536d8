//! Aggregation configuration from environment variables

use crate::aggregator_core::engine::{ConfigurationError, StockAgeThresholds};
use crate::aggregator_core::normalizer::UnknownCategoryPolicy;
use std::env;

/// What to do when a row fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectPolicy {
    /// Skip the row and count it; abort the run once the count exceeds
    /// `max_rejected`. The rejected count ends up in bundle metadata.
    SkipAndCount { max_rejected: u64 },
    /// Abort the run on the first invalid row
    Abort,
}

/// Configuration for one ingestion run
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct AggregationConfig {
    /// Canonical category vocabulary; raw categories match case-insensitively
    pub categories: Vec<String>,

    /// Policy for categories outside the vocabulary
    pub unknown_category_policy: UnknownCategoryPolicy,

    /// Stock-age bucket boundaries (echoed into bundle metadata)
    pub stock_age: StockAgeThresholds,

    /// Rows kept per category in the topBrands table
    pub top_brands_limit: usize,

    /// Row-level rejection policy
    pub reject_policy: RejectPolicy,

    /// Currency label used in KPI names
    pub currency: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            categories: vec!["Fashion".to_string(), "Grocery".to_string()],
            unknown_category_policy: UnknownCategoryPolicy::Reject,
            stock_age: StockAgeThresholds::default(),
            top_brands_limit: 10,
            reject_policy: RejectPolicy::SkipAndCount { max_rejected: 1000 },
            currency: "INR".to_string(),
        }
    }
}

impl AggregationConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `RETAILFLOW_CATEGORIES` (comma-separated, default: Fashion,Grocery)
    /// - `RETAILFLOW_UNKNOWN_CATEGORY` (`reject` or `other`, default: reject)
    /// - `RETAILFLOW_FRESH_MAX_DAYS` (default: 30)
    /// - `RETAILFLOW_NORMAL_MAX_DAYS` (default: 90)
    /// - `RETAILFLOW_TOP_BRANDS_LIMIT` (default: 10)
    /// - `RETAILFLOW_REJECT_POLICY` (`skip` or `abort`, default: skip)
    /// - `RETAILFLOW_MAX_REJECTED` (default: 1000)
    /// - `RETAILFLOW_CURRENCY` (default: INR)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let categories = env::var("RETAILFLOW_CATEGORIES")
            .map(|s| {
                s.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or(defaults.categories);

        let unknown_category_policy = match env::var("RETAILFLOW_UNKNOWN_CATEGORY").as_deref() {
            Ok("other") => UnknownCategoryPolicy::Other,
            _ => UnknownCategoryPolicy::Reject,
        };

        let stock_age = StockAgeThresholds {
            fresh_max_days: env::var("RETAILFLOW_FRESH_MAX_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stock_age.fresh_max_days),
            normal_max_days: env::var("RETAILFLOW_NORMAL_MAX_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stock_age.normal_max_days),
        };

        let top_brands_limit = env::var("RETAILFLOW_TOP_BRANDS_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.top_brands_limit);

        let max_rejected = env::var("RETAILFLOW_MAX_REJECTED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let reject_policy = match env::var("RETAILFLOW_REJECT_POLICY").as_deref() {
            Ok("abort") => RejectPolicy::Abort,
            _ => RejectPolicy::SkipAndCount { max_rejected },
        };

        let currency = env::var("RETAILFLOW_CURRENCY").unwrap_or(defaults.currency);

        Self {
            categories,
            unknown_category_policy,
            stock_age,
            top_brands_limit,
            reject_policy,
            currency,
        }
    }

    /// Fail fast on invalid configuration, before any record is read
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.categories.is_empty() {
            return Err(ConfigurationError::EmptyCategoryVocabulary);
        }
        self.stock_age.validate()?;
        if self.top_brands_limit == 0 {
            return Err(ConfigurationError::InvalidTopLimit {
                grouping: "topBrands".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Defaults and overrides exercised in one test body so the env mutations
    // cannot race across the parallel test runner
    #[test]
    fn test_config_from_env() {
        for var in [
            "RETAILFLOW_CATEGORIES",
            "RETAILFLOW_UNKNOWN_CATEGORY",
            "RETAILFLOW_FRESH_MAX_DAYS",
            "RETAILFLOW_NORMAL_MAX_DAYS",
            "RETAILFLOW_TOP_BRANDS_LIMIT",
            "RETAILFLOW_REJECT_POLICY",
            "RETAILFLOW_MAX_REJECTED",
            "RETAILFLOW_CURRENCY",
        ] {
            env::remove_var(var);
        }

        let config = AggregationConfig::from_env();
        assert_eq!(config.categories, vec!["Fashion", "Grocery"]);
        assert_eq!(
            config.unknown_category_policy,
            UnknownCategoryPolicy::Reject
        );
        assert_eq!(config.stock_age.fresh_max_days, 30.0);
        assert_eq!(config.stock_age.normal_max_days, 90.0);
        assert_eq!(config.top_brands_limit, 10);
        assert_eq!(
            config.reject_policy,
            RejectPolicy::SkipAndCount { max_rejected: 1000 }
        );
        assert_eq!(config.currency, "INR");
        assert!(config.validate().is_ok());

        env::set_var("RETAILFLOW_CATEGORIES", "Fashion, Grocery ,Electronics");
        env::set_var("RETAILFLOW_UNKNOWN_CATEGORY", "other");
        env::set_var("RETAILFLOW_FRESH_MAX_DAYS", "15");
        env::set_var("RETAILFLOW_REJECT_POLICY", "abort");
        env::set_var("RETAILFLOW_CURRENCY", "EUR");

        let config = AggregationConfig::from_env();
        assert_eq!(config.categories, vec!["Fashion", "Grocery", "Electronics"]);
        assert_eq!(config.unknown_category_policy, UnknownCategoryPolicy::Other);
        assert_eq!(config.stock_age.fresh_max_days, 15.0);
        assert_eq!(config.reject_policy, RejectPolicy::Abort);
        assert_eq!(config.currency, "EUR");

        for var in [
            "RETAILFLOW_CATEGORIES",
            "RETAILFLOW_UNKNOWN_CATEGORY",
            "RETAILFLOW_FRESH_MAX_DAYS",
            "RETAILFLOW_REJECT_POLICY",
            "RETAILFLOW_CURRENCY",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let mut config = AggregationConfig::default();
        config.top_brands_limit = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidTopLimit { .. })
        ));

        let mut config = AggregationConfig::default();
        config.categories.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::EmptyCategoryVocabulary)
        ));

        let mut config = AggregationConfig::default();
        config.stock_age.normal_max_days = 10.0;
        assert!(config.validate().is_err());
    }
}
