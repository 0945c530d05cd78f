use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Body of POST /api/cron/daily-analytics (optional)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyAnalyticsRequest {
    /// Day to roll up. When absent: yesterday (UTC) plus every day that
    /// received ledger rows since the previous run
    #[serde(default)]
    pub day: Option<NaiveDate>,
}
