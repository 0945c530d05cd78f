use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use contracts::usecases::u504_daily_analytics::{DailyAnalyticsRequest, DailyAnalyticsResponse};
use sea_orm::DatabaseConnection;
use std::collections::{BTreeSet, HashSet};

use crate::projections::p900_sales_ledger::repository as ledger;
use crate::projections::p901_daily_sales::service as daily_sales;
use crate::projections::p901_daily_sales::watermark;

const WATERMARK: &str = "daily_analytics";

/// Rows stamped just before the previous run started may have committed
/// after it read the ledger; they are picked up again.
const INGEST_OVERLAP_MINUTES: i64 = 10;

/// Rebuilds the per-day rollups of every tenant with sales that day
pub struct DailyAnalytics {
    db: DatabaseConnection,
}

impl DailyAnalytics {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// An explicit day recomputes only that day. The scheduled form also
    /// recomputes backfilled days (monthly CSVs, late uploads, retries that
    /// finished after midnight) and advances the watermark.
    pub async fn run(&self, request: DailyAnalyticsRequest) -> Result<DailyAnalyticsResponse> {
        match request.day {
            Some(day) => {
                let pairs = self.pairs_on(day).await?;
                let (rows, _) = self.recompute(&pairs).await;
                Ok(summarize(day, &pairs, rows, 0))
            }
            None => self.run_scheduled().await,
        }
    }

    async fn run_scheduled(&self) -> Result<DailyAnalyticsResponse> {
        let started_at = Utc::now();
        let day = yesterday_utc();

        let since = watermark::get(&self.db, WATERMARK)
            .await?
            .map(|at| at - Duration::minutes(INGEST_OVERLAP_MINUTES));
        let mut pairs = self.pairs_on(day).await?;
        let mut backfilled = 0;
        for pair in ledger::days_ingested_since(&self.db, since).await? {
            if pair.1 != day && pairs.insert(pair) {
                backfilled += 1;
            }
        }

        let (rows, failed) = self.recompute(&pairs).await;
        if failed == 0 {
            watermark::set(&self.db, WATERMARK, started_at).await?;
        } else {
            // Failed days stay behind the watermark and are retried next run
            tracing::warn!("Daily analytics: {} day(s) failed, watermark not advanced", failed);
        }

        Ok(summarize(day, &pairs, rows, backfilled))
    }

    async fn pairs_on(&self, day: NaiveDate) -> Result<BTreeSet<(String, NaiveDate)>> {
        Ok(ledger::tenants_with_events_on(&self.db, day)
            .await?
            .into_iter()
            .map(|tenant_id| (tenant_id, day))
            .collect())
    }

    /// Returns (rows written, failed pairs)
    async fn recompute(&self, pairs: &BTreeSet<(String, NaiveDate)>) -> (usize, usize) {
        let mut rows = 0;
        let mut failed = 0;
        for (tenant_id, day) in pairs {
            match daily_sales::recompute_day(&self.db, tenant_id, *day).await {
                Ok(n) => rows += n,
                // One tenant's failure leaves the others' rollups intact
                Err(e) => {
                    failed += 1;
                    tracing::error!("Daily analytics for tenant {} on {} failed: {}", tenant_id, day, e)
                }
            }
        }
        (rows, failed)
    }
}

fn summarize(
    day: NaiveDate,
    pairs: &BTreeSet<(String, NaiveDate)>,
    rows: usize,
    backfilled_days: usize,
) -> DailyAnalyticsResponse {
    let tenants = pairs.iter().map(|(t, _)| t.as_str()).collect::<HashSet<_>>().len();
    tracing::info!(
        "Daily analytics for {}: {} tenants, {} rows, {} backfilled day(s)",
        day,
        tenants,
        rows,
        backfilled_days
    );
    DailyAnalyticsResponse {
        day,
        tenants,
        rows,
        backfilled_days,
    }
}

fn yesterday_utc() -> NaiveDate {
    (Utc::now() - Duration::days(1)).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::p901_daily_sales::repository as daily_repo;
    use crate::shared::data::db::connect_in_memory;
    use bigdecimal::BigDecimal;
    use chrono::TimeZone;
    use contracts::enums::platform::Platform;
    use contracts::shared::normalized_record::NormalizedSaleRecord;

    fn sale(id: &str, title: &str, day: u32) -> NormalizedSaleRecord {
        NormalizedSaleRecord::sale(
            Some(id.to_string()),
            title,
            1,
            BigDecimal::from(3),
            "USD",
            Utc.with_ymd_and_hms(2024, 7, day, 12, 0, 0).unwrap(),
            serde_json::json!({ "id": id }),
        )
    }

    /// KDP monthly report row, dated the first of a month well in the past
    fn monthly_kdp_row(days_ago: i64) -> (NormalizedSaleRecord, NaiveDate) {
        let occurred_at = Utc::now() - Duration::days(days_ago);
        let record = NormalizedSaleRecord::sale(
            None,
            "Novel",
            4,
            BigDecimal::from(10),
            "USD",
            occurred_at,
            serde_json::json!({ "Title": "Novel", "Units Sold": 4 }),
        );
        (record, occurred_at.date_naive())
    }

    #[tokio::test]
    async fn test_rolls_up_every_tenant_with_sales_that_day() {
        let db = connect_in_memory().await;
        ledger::insert_records(&db, "t1", Platform::Gumroad, &[sale("1", "A", 4), sale("2", "B", 4)], "job:1")
            .await
            .unwrap();
        ledger::insert_records(&db, "t2", Platform::Payhip, &[sale("3", "A", 4), sale("4", "A", 5)], "job:2")
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        let response = DailyAnalytics::new(db.clone())
            .run(DailyAnalyticsRequest { day: Some(day) })
            .await
            .unwrap();
        assert_eq!(
            response,
            DailyAnalyticsResponse {
                day,
                tenants: 2,
                rows: 3,
                backfilled_days: 0
            }
        );

        let t2 = daily_repo::list_range(&db, "t2", day, day).await.unwrap();
        assert_eq!(t2.len(), 1);
        assert_eq!(t2[0].units_sold, 1);
        // Explicit days never move the scheduled watermark
        assert!(watermark::get(&db, WATERMARK).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_defaults_to_yesterday() {
        let db = connect_in_memory().await;
        let response = DailyAnalytics::new(db.clone())
            .run(DailyAnalyticsRequest::default())
            .await
            .unwrap();
        assert_eq!(response.day, yesterday_utc());
        assert_eq!(response.tenants, 0);
        assert!(watermark::get(&db, WATERMARK).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_scheduled_run_picks_up_backfilled_days() {
        let db = connect_in_memory().await;
        let (row, day) = monthly_kdp_row(40);
        ledger::insert_records(&db, "t1", Platform::AmazonKdp, &[row], "upload:1")
            .await
            .unwrap();

        let analytics = DailyAnalytics::new(db.clone());
        let response = analytics.run(DailyAnalyticsRequest::default()).await.unwrap();
        assert_eq!(response.backfilled_days, 1);
        assert_eq!(response.tenants, 1);
        assert_eq!(response.rows, 1);

        let rollup = daily_repo::list_range(&db, "t1", day, day).await.unwrap();
        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup[0].units_sold, 4);

        // Recomputing within the overlap window overwrites, never adds
        analytics.run(DailyAnalyticsRequest::default()).await.unwrap();
        assert_eq!(daily_repo::list_range(&db, "t1", day, day).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rows_before_watermark_are_not_revisited() {
        let db = connect_in_memory().await;
        let (row, _) = monthly_kdp_row(40);
        ledger::insert_records(&db, "t1", Platform::AmazonKdp, &[row], "upload:1")
            .await
            .unwrap();

        // A previous run started well after the row was ingested
        watermark::set(&db, WATERMARK, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let response = DailyAnalytics::new(db)
            .run(DailyAnalyticsRequest::default())
            .await
            .unwrap();
        assert_eq!(response.backfilled_days, 0);
        assert_eq!(response.rows, 0);
    }
}
