use anyhow::Result;
use chrono::Utc;
use contracts::enums::platform::Platform;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use uuid::Uuid;

/// Raw bytes kept for parse jobs and for manual inspection of bad input
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sys_upload_blobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub tenant_id: String,
    pub platform: String,
    pub kind: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub size: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Uploaded vendor CSV waiting for its parse job
pub const KIND_CSV_UPLOAD: &str = "csv_upload";
/// Vendor response body the adapter could not decode
pub const KIND_REJECTED_RESPONSE: &str = "rejected_response";

/// Сохранить сырые байты; возвращает id записи для ссылки из job payload
pub async fn save_blob<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    platform: Platform,
    kind: &str,
    file_name: Option<&str>,
    bytes: &[u8],
) -> Result<String> {
    let id = Uuid::new_v4().to_string();

    let active = ActiveModel {
        id: Set(id.clone()),
        tenant_id: Set(tenant_id.to_string()),
        platform: Set(platform.code().to_string()),
        kind: Set(kind.to_string()),
        file_name: Set(file_name.map(|s| s.to_string())),
        bytes: Set(bytes.to_vec()),
        size: Set(bytes.len() as i64),
        created_at: Set(Utc::now()),
    };
    active.insert(db).await?;

    tracing::debug!(
        "Saved blob: tenant={}, platform={}, kind={}, size={}, id={}",
        tenant_id,
        platform,
        kind,
        bytes.len(),
        id
    );

    Ok(id)
}

pub async fn get_blob<C: ConnectionTrait>(db: &C, id: &str) -> Result<Option<Model>> {
    Ok(Entity::find_by_id(id.to_string()).one(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;

    #[tokio::test]
    async fn test_blob_round_trip_keeps_exact_bytes() {
        let db = connect_in_memory().await;
        let bytes = b"Title,Units\n\xff\xfe broken".to_vec();
        let id = save_blob(
            &db,
            "tenant-1",
            Platform::Kobo,
            KIND_CSV_UPLOAD,
            Some("kobo.csv"),
            &bytes,
        )
        .await
        .unwrap();

        let stored = get_blob(&db, &id).await.unwrap().unwrap();
        assert_eq!(stored.bytes, bytes);
        assert_eq!(stored.size, bytes.len() as i64);
        assert_eq!(stored.platform, "kobo");
        assert!(get_blob(&db, "missing").await.unwrap().is_none());
    }
}
