use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::Set;

/// Start time of the last completed scheduled rollup, per routine name
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "p901_rollup_watermark")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub started_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub async fn get<C: ConnectionTrait>(db: &C, name: &str) -> Result<Option<DateTime<Utc>>> {
    Ok(Entity::find_by_id(name.to_string())
        .one(db)
        .await?
        .map(|m| m.started_at))
}

pub async fn set<C: ConnectionTrait>(db: &C, name: &str, started_at: DateTime<Utc>) -> Result<()> {
    let active = ActiveModel {
        name: Set(name.to_string()),
        started_at: Set(started_at),
    };
    Entity::insert(active)
        .on_conflict(
            OnConflict::column(Column::Name)
                .update_column(Column::StartedAt)
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}
