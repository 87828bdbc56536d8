//! retailflow - Retail Analytics Aggregation Core
//!
//! One streaming pass over transaction records produces the aggregate tables
//! and KPI scalars a dashboard consumes, assembled into an immutable,
//! versioned bundle snapshot.

pub mod aggregator_core;
pub mod pipeline;
