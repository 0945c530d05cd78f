use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use contracts::enums::platform::Platform;
use contracts::projections::p900_sales_ledger::dto::{SalesEvent, UpsertOutcome};
use contracts::shared::normalized_record::{NormalizedSaleRecord, SaleKind};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{PaginatorTrait, QueryOrder, QuerySelect, Set};
use std::str::FromStr;
use uuid::Uuid;

use super::natural_key::natural_key;

/// Append-only sales ledger. Rows are only ever inserted; a refund is a
/// new row with negative quantity and amount.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "p900_sales_ledger")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub platform: String,
    pub natural_key: String,
    pub platform_txn_id: Option<String>,
    pub event_type: String,
    pub title: String,
    pub quantity: i64,
    /// Decimal as text, native currency
    pub amount: String,
    pub currency: String,
    pub occurred_at: DateTimeUtc,
    /// YYYY-MM-DD of occurred_at, for range scans
    pub occurred_on: String,
    pub raw: String,
    pub source: String,
    pub ingested_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for SalesEvent {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self> {
        let platform = Platform::from_code(&m.platform)
            .ok_or_else(|| anyhow::anyhow!("Unknown platform '{}' in ledger row {}", m.platform, m.id))?;
        let event_type = SaleKind::from_str_opt(&m.event_type)
            .ok_or_else(|| anyhow::anyhow!("Unknown event type '{}'", m.event_type))?;
        let amount = BigDecimal::from_str(&m.amount)
            .map_err(|e| anyhow::anyhow!("Bad amount '{}' in ledger row {}: {}", m.amount, m.id, e))?;
        let occurred_on = NaiveDate::parse_from_str(&m.occurred_on, "%Y-%m-%d")?;

        Ok(SalesEvent {
            id: m.id,
            tenant_id: m.tenant_id,
            platform,
            natural_key: m.natural_key,
            platform_txn_id: m.platform_txn_id,
            event_type,
            title: m.title,
            quantity: m.quantity,
            amount,
            currency: m.currency,
            occurred_at: m.occurred_at,
            occurred_on,
            raw: serde_json::from_str(&m.raw).unwrap_or(serde_json::Value::Null),
            source: m.source,
            ingested_at: m.ingested_at,
        })
    }
}

/// Conditional insert keyed by (tenant, platform, natural key).
///
/// `inserted: false` means the event was already in the ledger; the
/// existing row is left untouched.
pub async fn upsert_sales_event<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
    record: &NormalizedSaleRecord,
    source: &str,
) -> Result<UpsertOutcome> {
    let key = natural_key(tenant_id, platform, record);

    let active = ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        tenant_id: Set(tenant_id.to_string()),
        platform: Set(platform.code().to_string()),
        natural_key: Set(key.clone()),
        platform_txn_id: Set(record.platform_txn_id.clone()),
        event_type: Set(record.kind.as_str().to_string()),
        title: Set(record.title.clone()),
        quantity: Set(record.quantity),
        amount: Set(record.amount.to_string()),
        currency: Set(record.currency.clone()),
        occurred_at: Set(record.occurred_at),
        occurred_on: Set(record.occurred_at.format("%Y-%m-%d").to_string()),
        raw: Set(record.raw.to_string()),
        source: Set(source.to_string()),
        ingested_at: Set(Utc::now()),
    };

    let rows = Entity::insert(active)
        .on_conflict(
            OnConflict::columns([Column::TenantId, Column::Platform, Column::NaturalKey])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    if rows == 0 {
        tracing::debug!(
            "Ledger: duplicate ignored (tenant={}, platform={}, key={})",
            tenant_id,
            platform,
            key
        );
    }

    Ok(UpsertOutcome { inserted: rows > 0 })
}

/// Insert a batch, returning how many rows were new
pub async fn insert_records<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
    records: &[NormalizedSaleRecord],
    source: &str,
) -> Result<i64> {
    let mut inserted = 0i64;
    for record in records {
        if upsert_sales_event(db, tenant_id, platform, record, source)
            .await?
            .inserted
        {
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Events of a tenant with `occurred_on` in [from, to], oldest first
pub async fn list_range<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    platform: Option<Platform>,
) -> Result<Vec<SalesEvent>> {
    let mut query = Entity::find()
        .filter(Column::TenantId.eq(tenant_id))
        .filter(Column::OccurredOn.gte(from.format("%Y-%m-%d").to_string()))
        .filter(Column::OccurredOn.lte(to.format("%Y-%m-%d").to_string()));
    if let Some(p) = platform {
        query = query.filter(Column::Platform.eq(p.code()));
    }

    query
        .order_by_asc(Column::OccurredAt)
        .order_by_asc(Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(SalesEvent::try_from)
        .collect()
}

/// Tenants that have at least one event on `day`
pub async fn tenants_with_events_on<C: ConnectionTrait>(db: &C, day: NaiveDate) -> Result<Vec<String>> {
    let tenants: Vec<String> = Entity::find()
        .select_only()
        .column(Column::TenantId)
        .distinct()
        .filter(Column::OccurredOn.eq(day.format("%Y-%m-%d").to_string()))
        .order_by_asc(Column::TenantId)
        .into_tuple()
        .all(db)
        .await?;
    Ok(tenants)
}

/// (tenant, day) pairs that received rows at or after `since`; every pair
/// when `since` is `None`. Days are keyed by `occurred_on`, so backfilled
/// history shows up here as well.
pub async fn days_ingested_since<C: ConnectionTrait>(
    db: &C,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<(String, NaiveDate)>> {
    let mut query = Entity::find()
        .select_only()
        .column(Column::TenantId)
        .column(Column::OccurredOn)
        .distinct();
    if let Some(since) = since {
        query = query.filter(Column::IngestedAt.gte(since));
    }

    let pairs: Vec<(String, String)> = query
        .order_by_asc(Column::TenantId)
        .order_by_asc(Column::OccurredOn)
        .into_tuple()
        .all(db)
        .await?;

    pairs
        .into_iter()
        .map(|(tenant_id, day)| {
            let day = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("Bad occurred_on '{}': {}", day, e))?;
            Ok((tenant_id, day))
        })
        .collect()
}

pub async fn count_for_tenant<C: ConnectionTrait>(db: &C, tenant_id: &str) -> Result<u64> {
    Ok(Entity::find()
        .filter(Column::TenantId.eq(tenant_id))
        .count(db)
        .await?)
}
