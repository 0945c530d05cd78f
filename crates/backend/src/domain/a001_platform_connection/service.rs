use super::repository;
use contracts::domain::a001_platform_connection::aggregate::{
    PlatformConnectionView, UpsertConnectionRequest,
};
use contracts::enums::platform::Platform;
use sea_orm::ConnectionTrait;

/// Сохранение учётных данных площадки (создание или замена)
pub async fn save_credential<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
    request: UpsertConnectionRequest,
) -> anyhow::Result<PlatformConnectionView> {
    let credential = request.credential.trim();
    if credential.is_empty() {
        anyhow::bail!("Validation failed: credential must not be empty");
    }
    if tenant_id.trim().is_empty() {
        anyhow::bail!("Validation failed: tenant id must not be empty");
    }

    let saved = repository::upsert(db, tenant_id, platform, credential).await?;
    Ok(saved.redacted())
}

pub async fn list_views<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
) -> anyhow::Result<Vec<PlatformConnectionView>> {
    Ok(repository::list_for_tenant(db, tenant_id)
        .await?
        .iter()
        .map(|c| c.redacted())
        .collect())
}

pub async fn get_view<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
) -> anyhow::Result<Option<PlatformConnectionView>> {
    Ok(repository::get(db, tenant_id, platform)
        .await?
        .map(|c| c.redacted()))
}
