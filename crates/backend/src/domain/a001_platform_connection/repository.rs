use anyhow::Result;
use chrono::{DateTime, Utc};
use contracts::domain::a001_platform_connection::aggregate::{ConnectionStatus, PlatformConnection};
use contracts::enums::platform::Platform;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{QueryOrder, Set};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "a001_platform_connection")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub platform: String,
    pub status: String,
    pub credential: String,
    pub last_error: Option<String>,
    pub synced_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

// Credential never reaches log output
impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("platform", &self.platform)
            .field("status", &self.status)
            .field("credential", &"****")
            .finish()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for PlatformConnection {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self> {
        let platform = Platform::from_code(&m.platform)
            .ok_or_else(|| anyhow::anyhow!("Unknown platform '{}' in connection {}", m.platform, m.id))?;
        Ok(PlatformConnection {
            id: m.id,
            tenant_id: m.tenant_id,
            platform,
            status: ConnectionStatus::from_str_opt(&m.status).unwrap_or_default(),
            credential: m.credential,
            last_error: m.last_error,
            synced_at: m.synced_at,
            created_at: m.created_at,
            updated_at: m.updated_at,
        })
    }
}

fn into_aggregates(models: Vec<Model>) -> Result<Vec<PlatformConnection>> {
    models.into_iter().map(PlatformConnection::try_from).collect()
}

pub async fn get<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
) -> Result<Option<PlatformConnection>> {
    Entity::find()
        .filter(Column::TenantId.eq(tenant_id))
        .filter(Column::Platform.eq(platform.code()))
        .one(db)
        .await?
        .map(PlatformConnection::try_from)
        .transpose()
}

/// Last write wins: stores the credential, marks the connection usable
/// again and clears any previous error.
pub async fn upsert<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
    credential: &str,
) -> Result<PlatformConnection> {
    let now = Utc::now();
    let active = ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        tenant_id: Set(tenant_id.to_string()),
        platform: Set(platform.code().to_string()),
        status: Set(ConnectionStatus::Connected.as_str().to_string()),
        credential: Set(credential.to_string()),
        last_error: Set(None),
        synced_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    Entity::insert(active)
        .on_conflict(
            OnConflict::columns([Column::TenantId, Column::Platform])
                .update_columns([
                    Column::Credential,
                    Column::Status,
                    Column::LastError,
                    Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    tracing::info!("Connection saved: tenant={}, platform={}", tenant_id, platform);

    get(db, tenant_id, platform)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Connection vanished after upsert"))
}

/// Flag the credential as unusable until the author reconnects
pub async fn mark_error<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
    reason: &str,
) -> Result<()> {
    let result = Entity::update_many()
        .col_expr(Column::Status, Expr::value(ConnectionStatus::Error.as_str()))
        .col_expr(Column::LastError, Expr::value(reason.to_string()))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(Column::TenantId.eq(tenant_id))
        .filter(Column::Platform.eq(platform.code()))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        tracing::warn!(
            "mark_error: no connection for tenant={}, platform={}",
            tenant_id,
            platform
        );
    }
    Ok(())
}

/// High-water mark for incremental pulls; a reconnect keeps it
pub async fn mark_synced<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
    at: DateTime<Utc>,
) -> Result<()> {
    Entity::update_many()
        .col_expr(Column::SyncedAt, Expr::value(at))
        .filter(Column::TenantId.eq(tenant_id))
        .filter(Column::Platform.eq(platform.code()))
        .exec(db)
        .await?;
    Ok(())
}

pub async fn list_for_tenant<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
) -> Result<Vec<PlatformConnection>> {
    let models = Entity::find()
        .filter(Column::TenantId.eq(tenant_id))
        .order_by_asc(Column::Platform)
        .all(db)
        .await?;
    into_aggregates(models)
}

/// Every connection in `connected` state, across tenants
pub async fn list_connected<C: ConnectionTrait>(db: &C) -> Result<Vec<PlatformConnection>> {
    let models = Entity::find()
        .filter(Column::Status.eq(ConnectionStatus::Connected.as_str()))
        .order_by_asc(Column::TenantId)
        .order_by_asc(Column::Platform)
        .all(db)
        .await?;
    into_aggregates(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;

    #[tokio::test]
    async fn test_upsert_is_last_write_wins() {
        let db = connect_in_memory().await;

        let first = upsert(&db, "t1", Platform::Gumroad, "token-a").await.unwrap();
        mark_error(&db, "t1", Platform::Gumroad, "401").await.unwrap();

        let errored = get(&db, "t1", Platform::Gumroad).await.unwrap().unwrap();
        assert_eq!(errored.status, ConnectionStatus::Error);
        assert_eq!(errored.last_error.as_deref(), Some("401"));

        let second = upsert(&db, "t1", Platform::Gumroad, "token-b").await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.credential, "token-b");
        assert_eq!(second.status, ConnectionStatus::Connected);
        assert!(second.last_error.is_none());

        assert_eq!(list_for_tenant(&db, "t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_connected_skips_errored() {
        let db = connect_in_memory().await;
        upsert(&db, "t1", Platform::Gumroad, "a").await.unwrap();
        upsert(&db, "t2", Platform::Payhip, "b").await.unwrap();
        mark_error(&db, "t2", Platform::Payhip, "expired").await.unwrap();

        let connected = list_connected(&db).await.unwrap();
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].tenant_id, "t1");
    }

    #[tokio::test]
    async fn test_synced_at_survives_reconnect() {
        let db = connect_in_memory().await;
        let fresh = upsert(&db, "t1", Platform::Lulu, "a").await.unwrap();
        assert!(fresh.synced_at.is_none());

        let at = Utc::now();
        mark_synced(&db, "t1", Platform::Lulu, at).await.unwrap();
        upsert(&db, "t1", Platform::Lulu, "b").await.unwrap();

        let stored = get(&db, "t1", Platform::Lulu).await.unwrap().unwrap();
        assert_eq!(stored.synced_at.map(|t| t.timestamp()), Some(at.timestamp()));
        assert_eq!(stored.credential, "b");
    }
}
