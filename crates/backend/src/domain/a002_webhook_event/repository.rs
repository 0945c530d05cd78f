use anyhow::Result;
use chrono::Utc;
use contracts::domain::a002_webhook_event::aggregate::{DeliveryStatus, WebhookEvent};
use contracts::enums::platform::Platform;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{QueryOrder, QuerySelect, Set};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "a002_webhook_event")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub platform: String,
    pub delivery_id: String,
    pub tenant_id: Option<String>,
    pub event_type: String,
    pub status: String,
    pub note: Option<String>,
    pub raw_payload: String,
    pub received_at: DateTimeUtc,
    pub processed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for WebhookEvent {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self> {
        let platform = Platform::from_code(&m.platform)
            .ok_or_else(|| anyhow::anyhow!("Unknown platform '{}' in webhook {}", m.platform, m.id))?;
        let status = DeliveryStatus::from_str_opt(&m.status)
            .ok_or_else(|| anyhow::anyhow!("Unknown delivery status '{}'", m.status))?;
        Ok(WebhookEvent {
            id: m.id,
            platform,
            delivery_id: m.delivery_id,
            tenant_id: m.tenant_id,
            event_type: m.event_type,
            status,
            note: m.note,
            raw_payload: m.raw_payload,
            received_at: m.received_at,
            processed_at: m.processed_at,
        })
    }
}

/// Dedup gate: records the delivery as `received` unless this
/// (platform, delivery id) was seen before. Returns the new row id, or
/// `None` for a redelivery.
pub async fn insert_if_absent<C: ConnectionTrait>(
    db: &C,
    platform: Platform,
    delivery_id: &str,
    raw_payload: &str,
) -> Result<Option<String>> {
    let id = Uuid::new_v4().to_string();
    let active = ActiveModel {
        id: Set(id.clone()),
        platform: Set(platform.code().to_string()),
        delivery_id: Set(delivery_id.to_string()),
        tenant_id: Set(None),
        event_type: Set("unknown".to_string()),
        status: Set(DeliveryStatus::Received.as_str().to_string()),
        note: Set(None),
        raw_payload: Set(raw_payload.to_string()),
        received_at: Set(Utc::now()),
        processed_at: Set(None),
    };

    let inserted = Entity::insert(active)
        .on_conflict(
            OnConflict::columns([Column::Platform, Column::DeliveryId])
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    Ok((inserted > 0).then_some(id))
}

/// Terminal update; a row leaves `received` exactly once
pub async fn finish<C: ConnectionTrait>(
    db: &C,
    id: &str,
    status: DeliveryStatus,
    tenant_id: Option<&str>,
    event_type: &str,
    note: Option<&str>,
) -> Result<bool> {
    let result = Entity::update_many()
        .col_expr(Column::Status, Expr::value(status.as_str()))
        .col_expr(Column::TenantId, Expr::value(tenant_id.map(|t| t.to_string())))
        .col_expr(Column::EventType, Expr::value(event_type.to_string()))
        .col_expr(Column::Note, Expr::value(note.map(|n| n.to_string())))
        .col_expr(Column::ProcessedAt, Expr::value(Some(Utc::now())))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(DeliveryStatus::Received.as_str()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

pub async fn get_by_delivery<C: ConnectionTrait>(
    db: &C,
    platform: Platform,
    delivery_id: &str,
) -> Result<Option<WebhookEvent>> {
    Entity::find()
        .filter(Column::Platform.eq(platform.code()))
        .filter(Column::DeliveryId.eq(delivery_id))
        .one(db)
        .await?
        .map(WebhookEvent::try_from)
        .transpose()
}

/// Newest deliveries first
pub async fn list_recent<C: ConnectionTrait>(
    db: &C,
    platform: Option<Platform>,
    limit: u64,
) -> Result<Vec<WebhookEvent>> {
    let mut query = Entity::find().order_by_desc(Column::ReceivedAt);
    if let Some(p) = platform {
        query = query.filter(Column::Platform.eq(p.code()));
    }
    query
        .limit(limit)
        .all(db)
        .await?
        .into_iter()
        .map(WebhookEvent::try_from)
        .collect()
}
