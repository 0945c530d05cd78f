use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAnalyticsResponse {
    pub day: NaiveDate,
    pub tenants: usize,
    pub rows: usize,
    /// Other (tenant, day) pairs recomputed because new rows landed on them
    /// since the previous scheduled run
    #[serde(default)]
    pub backfilled_days: usize,
}
