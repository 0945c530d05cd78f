use crate::enums::platform::Platform;
use crate::shared::normalized_record::SaleKind;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One row of the append-only sales ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesEvent {
    pub id: String,
    pub tenant_id: String,
    pub platform: Platform,
    pub natural_key: String,
    pub platform_txn_id: Option<String>,
    pub event_type: SaleKind,
    pub title: String,
    pub quantity: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub occurred_at: DateTime<Utc>,
    pub occurred_on: NaiveDate,
    pub raw: serde_json::Value,
    /// `job:<id>` or `webhook:<id>`
    pub source: String,
    pub ingested_at: DateTime<Utc>,
}

/// Result of the conditional ledger insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: bool,
}

/// GET /api/tenants/:tenant_id/sales
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesRangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default)]
    pub platform: Option<Platform>,
}
