use crate::enums::platform::Platform;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Daily per-book rollup derived from the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySalesSummary {
    pub tenant_id: String,
    pub day: NaiveDate,
    pub platform: Platform,
    pub title: String,
    pub currency: String,
    pub units_sold: i64,
    pub units_refunded: i64,
    pub net_units: i64,
    pub gross_amount: BigDecimal,
    pub refunded_amount: BigDecimal,
    pub net_amount: BigDecimal,
    pub event_count: i64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySalesQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}
