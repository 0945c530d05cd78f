use anyhow::Result;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use contracts::enums::platform::Platform;
use contracts::projections::p901_daily_sales::dto::DailySalesSummary;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{QueryOrder, Set};
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "p901_daily_sales")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub day: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub platform: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub title: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub currency: String,
    pub units_sold: i64,
    pub units_refunded: i64,
    pub net_units: i64,
    pub gross_amount: String,
    pub refunded_amount: String,
    pub net_amount: String,
    pub event_count: i64,
    pub computed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn decimal(s: &str) -> Result<BigDecimal> {
    BigDecimal::from_str(s).map_err(|e| anyhow::anyhow!("Bad decimal '{}': {}", s, e))
}

impl TryFrom<Model> for DailySalesSummary {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self> {
        Ok(DailySalesSummary {
            platform: Platform::from_code(&m.platform)
                .ok_or_else(|| anyhow::anyhow!("Unknown platform '{}'", m.platform))?,
            day: NaiveDate::parse_from_str(&m.day, "%Y-%m-%d")?,
            gross_amount: decimal(&m.gross_amount)?,
            refunded_amount: decimal(&m.refunded_amount)?,
            net_amount: decimal(&m.net_amount)?,
            tenant_id: m.tenant_id,
            title: m.title,
            currency: m.currency,
            units_sold: m.units_sold,
            units_refunded: m.units_refunded,
            net_units: m.net_units,
            event_count: m.event_count,
            computed_at: m.computed_at,
        })
    }
}

/// Rollups are derived data: a recomputed row overwrites the previous one
pub async fn upsert_rows<C: ConnectionTrait>(db: &C, rows: &[DailySalesSummary]) -> Result<usize> {
    for row in rows {
        let active = ActiveModel {
            tenant_id: Set(row.tenant_id.clone()),
            day: Set(row.day.format("%Y-%m-%d").to_string()),
            platform: Set(row.platform.code().to_string()),
            title: Set(row.title.clone()),
            currency: Set(row.currency.clone()),
            units_sold: Set(row.units_sold),
            units_refunded: Set(row.units_refunded),
            net_units: Set(row.net_units),
            gross_amount: Set(row.gross_amount.to_string()),
            refunded_amount: Set(row.refunded_amount.to_string()),
            net_amount: Set(row.net_amount.to_string()),
            event_count: Set(row.event_count),
            computed_at: Set(row.computed_at),
        };

        Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    Column::TenantId,
                    Column::Day,
                    Column::Platform,
                    Column::Title,
                    Column::Currency,
                ])
                .update_columns([
                    Column::UnitsSold,
                    Column::UnitsRefunded,
                    Column::NetUnits,
                    Column::GrossAmount,
                    Column::RefundedAmount,
                    Column::NetAmount,
                    Column::EventCount,
                    Column::ComputedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
    }
    Ok(rows.len())
}

pub async fn list_range<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DailySalesSummary>> {
    Entity::find()
        .filter(Column::TenantId.eq(tenant_id))
        .filter(Column::Day.gte(from.format("%Y-%m-%d").to_string()))
        .filter(Column::Day.lte(to.format("%Y-%m-%d").to_string()))
        .order_by_asc(Column::Day)
        .order_by_asc(Column::Platform)
        .order_by_asc(Column::Title)
        .all(db)
        .await?
        .into_iter()
        .map(DailySalesSummary::try_from)
        .collect()
}
