use anyhow::Result;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::Set;

/// Read model of author profiles (owned by the account service); used
/// here only to attribute webhooks by buyer/seller e-mail.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "a003_tenant_profile")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Case-insensitive lookup; e-mails are stored lower-cased
pub async fn find_tenant_by_email<C: ConnectionTrait>(db: &C, email: &str) -> Result<Option<String>> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Ok(None);
    }
    Ok(Entity::find()
        .filter(Column::Email.eq(email))
        .one(db)
        .await?
        .map(|m| m.tenant_id))
}

pub async fn upsert<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    email: &str,
    display_name: Option<&str>,
) -> Result<()> {
    let active = ActiveModel {
        tenant_id: Set(tenant_id.to_string()),
        email: Set(normalize_email(email)),
        display_name: Set(display_name.map(|s| s.to_string())),
        created_at: Set(Utc::now()),
    };
    Entity::insert(active)
        .on_conflict(
            OnConflict::column(Column::TenantId)
                .update_columns([Column::Email, Column::DisplayName])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;

    #[tokio::test]
    async fn test_lookup_ignores_case() {
        let db = connect_in_memory().await;
        upsert(&db, "t1", "Author@Example.COM", Some("A. Author")).await.unwrap();

        assert_eq!(
            find_tenant_by_email(&db, " author@example.com ").await.unwrap(),
            Some("t1".to_string())
        );
        assert_eq!(find_tenant_by_email(&db, "nobody@example.com").await.unwrap(), None);
        assert_eq!(find_tenant_by_email(&db, "").await.unwrap(), None);
    }
}
