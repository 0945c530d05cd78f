use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use contracts::enums::platform::Platform;
use contracts::projections::p900_sales_ledger::dto::SalesEvent;
use contracts::projections::p901_daily_sales::dto::DailySalesSummary;
use sea_orm::ConnectionTrait;
use std::collections::BTreeMap;

use super::repository;
use crate::projections::p900_sales_ledger::repository as ledger;

/// Группировка событий дня по (площадка, книга, валюта).
/// Amounts are never converted; each currency gets its own row.
pub fn rollup(tenant_id: &str, day: NaiveDate, events: &[SalesEvent]) -> Vec<DailySalesSummary> {
    let computed_at = Utc::now();
    let mut groups: BTreeMap<(String, String, String), DailySalesSummary> = BTreeMap::new();

    for event in events.iter().filter(|e| e.occurred_on == day) {
        let key = (
            event.platform.code().to_string(),
            event.title.clone(),
            event.currency.clone(),
        );
        let row = groups.entry(key).or_insert_with(|| empty_row(tenant_id, day, event.platform, event, computed_at));

        if event.quantity >= 0 {
            row.units_sold += event.quantity;
        } else {
            row.units_refunded += -event.quantity;
        }
        if event.amount >= BigDecimal::from(0) {
            row.gross_amount += &event.amount;
        } else {
            row.refunded_amount += -event.amount.clone();
        }
        row.net_units += event.quantity;
        row.net_amount += &event.amount;
        row.event_count += 1;
    }

    groups.into_values().collect()
}

fn empty_row(
    tenant_id: &str,
    day: NaiveDate,
    platform: Platform,
    event: &SalesEvent,
    computed_at: chrono::DateTime<Utc>,
) -> DailySalesSummary {
    DailySalesSummary {
        tenant_id: tenant_id.to_string(),
        day,
        platform,
        title: event.title.clone(),
        currency: event.currency.clone(),
        units_sold: 0,
        units_refunded: 0,
        net_units: 0,
        gross_amount: BigDecimal::from(0),
        refunded_amount: BigDecimal::from(0),
        net_amount: BigDecimal::from(0),
        event_count: 0,
        computed_at,
    }
}

/// Re-derive one tenant's rollups for `day` from the ledger
pub async fn recompute_day<C: ConnectionTrait>(db: &C, tenant_id: &str, day: NaiveDate) -> Result<usize> {
    let events = ledger::list_range(db, tenant_id, day, day, None).await?;
    let rows = rollup(tenant_id, day, &events);
    repository::upsert_rows(db, &rows).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use chrono::TimeZone;
    use contracts::shared::normalized_record::NormalizedSaleRecord;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn at(h: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_recompute_day_nets_refunds() {
        let db = connect_in_memory().await;
        let records = vec![
            NormalizedSaleRecord::sale(Some("1".into()), "Novel", 2, dec("19.98"), "USD", at(9), serde_json::json!({})),
            NormalizedSaleRecord::sale(Some("2".into()), "Novel", 1, dec("9.99"), "USD", at(10), serde_json::json!({})),
            NormalizedSaleRecord::refund(Some("1".into()), "Novel", 1, dec("9.99"), "USD", at(11), serde_json::json!({})),
            NormalizedSaleRecord::sale(Some("3".into()), "Novel", 1, dec("8.50"), "EUR", at(12), serde_json::json!({})),
        ];
        ledger::insert_records(&db, "t1", Platform::Payhip, &records, "job:x")
            .await
            .unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(recompute_day(&db, "t1", day).await.unwrap(), 2);
        // Idempotent: recomputing overwrites instead of adding
        assert_eq!(recompute_day(&db, "t1", day).await.unwrap(), 2);

        let rows = repository::list_range(&db, "t1", day, day).await.unwrap();
        assert_eq!(rows.len(), 2);
        let usd = rows.iter().find(|r| r.currency == "USD").unwrap();
        assert_eq!(usd.units_sold, 3);
        assert_eq!(usd.units_refunded, 1);
        assert_eq!(usd.net_units, 2);
        assert_eq!(usd.gross_amount, dec("29.97"));
        assert_eq!(usd.refunded_amount, dec("9.99"));
        assert_eq!(usd.net_amount, dec("19.98"));
        assert_eq!(usd.event_count, 3);
    }
}
