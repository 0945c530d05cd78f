use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use contracts::domain::common::AggregateId;
use contracts::enums::platform::Platform;
use contracts::system::ingestion_jobs::{
    IngestionJob, IngestionJobId, JobPayload, JobStatus, JobStatusSummary,
};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{DbBackend, QueryOrder, QuerySelect, Set, Statement};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sys_ingestion_jobs")]
pub struct Model {
    /// Submission order
    #[sea_orm(primary_key)]
    pub seq: i64,
    pub id: String,
    pub tenant_id: String,
    pub platform: String,
    pub status: String,
    pub payload: String,
    pub attempt: i32,
    pub parent_job_id: Option<String>,
    pub records_written: i64,
    pub last_error: Option<String>,
    /// epoch ms
    pub available_at: i64,
    pub delayed: bool,
    /// epoch ms, set while running
    pub lease_expires_at: Option<i64>,
    pub created_at: DateTimeUtc,
    pub last_attempted_at: Option<DateTimeUtc>,
    pub finished_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

fn parse_job_id(s: &str) -> Result<IngestionJobId> {
    IngestionJobId::from_string(s).map_err(|e| anyhow::anyhow!(e))
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

impl TryFrom<Model> for IngestionJob {
    type Error = anyhow::Error;

    fn try_from(m: Model) -> Result<Self> {
        Ok(IngestionJob {
            id: parse_job_id(&m.id)?,
            seq: m.seq,
            platform: Platform::from_code(&m.platform)
                .ok_or_else(|| anyhow::anyhow!("Unknown platform '{}' in job {}", m.platform, m.id))?,
            status: JobStatus::from_str_opt(&m.status)
                .ok_or_else(|| anyhow::anyhow!("Unknown job status '{}'", m.status))?,
            payload: serde_json::from_str::<JobPayload>(&m.payload)?,
            parent_job_id: m.parent_job_id.as_deref().map(parse_job_id).transpose()?,
            tenant_id: m.tenant_id,
            attempt: m.attempt,
            records_written: m.records_written,
            last_error: m.last_error,
            available_at: from_millis(m.available_at),
            delayed: m.delayed,
            created_at: m.created_at,
            last_attempted_at: m.last_attempted_at,
            finished_at: m.finished_at,
        })
    }
}

fn into_jobs(models: Vec<Model>) -> Result<Vec<IngestionJob>> {
    models.into_iter().map(IngestionJob::try_from).collect()
}

/// Новая запись задания в статусе pending
pub struct NewJob<'a> {
    pub tenant_id: &'a str,
    pub platform: Platform,
    pub payload: &'a JobPayload,
    pub attempt: i32,
    pub parent_job_id: Option<IngestionJobId>,
    pub available_at_ms: i64,
    pub delayed: bool,
}

pub async fn insert<C: ConnectionTrait>(db: &C, new_job: NewJob<'_>) -> Result<IngestionJob> {
    let active = ActiveModel {
        id: Set(IngestionJobId::new_v4().as_string()),
        tenant_id: Set(new_job.tenant_id.to_string()),
        platform: Set(new_job.platform.code().to_string()),
        status: Set(JobStatus::Pending.as_str().to_string()),
        payload: Set(serde_json::to_string(new_job.payload)?),
        attempt: Set(new_job.attempt),
        parent_job_id: Set(new_job.parent_job_id.map(|p| p.as_string())),
        records_written: Set(0),
        last_error: Set(None),
        available_at: Set(new_job.available_at_ms),
        delayed: Set(new_job.delayed),
        lease_expires_at: Set(None),
        created_at: Set(Utc::now()),
        last_attempted_at: Set(None),
        finished_at: Set(None),
        ..Default::default()
    };
    let model = active.insert(db).await?;
    IngestionJob::try_from(model)
}

pub async fn get<C: ConnectionTrait>(db: &C, id: &IngestionJobId) -> Result<Option<IngestionJob>> {
    Entity::find()
        .filter(Column::Id.eq(id.as_string()))
        .one(db)
        .await?
        .map(IngestionJob::try_from)
        .transpose()
}

/// Oldest ready pending job whose (tenant, platform) pair has nothing running
pub async fn find_claimable<C: ConnectionTrait>(db: &C, now_ms: i64) -> Result<Option<Model>> {
    let sql = r#"
        SELECT j.* FROM sys_ingestion_jobs j
        WHERE j.status = 'pending'
          AND j.delayed = 0
          AND j.available_at <= ?
          AND NOT EXISTS (
              SELECT 1 FROM sys_ingestion_jobs r
              WHERE r.tenant_id = j.tenant_id
                AND r.platform = j.platform
                AND r.status = 'running'
          )
        ORDER BY j.seq ASC
        LIMIT 1
    "#;
    let model = Entity::find()
        .from_raw_sql(Statement::from_sql_and_values(
            DbBackend::Sqlite,
            sql,
            [now_ms.into()],
        ))
        .one(db)
        .await?;
    Ok(model)
}

/// pending → running, guarded by the current status
pub async fn start<C: ConnectionTrait>(db: &C, id: &str, now: DateTime<Utc>, lease_until_ms: i64) -> Result<bool> {
    let result = Entity::update_many()
        .col_expr(Column::Status, Expr::value(JobStatus::Running.as_str()))
        .col_expr(Column::LastAttemptedAt, Expr::value(Some(now)))
        .col_expr(Column::LeaseExpiresAt, Expr::value(Some(lease_until_ms)))
        .filter(Column::Id.eq(id))
        .filter(Column::Status.eq(JobStatus::Pending.as_str()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// running → succeeded | failed, guarded by the current status
pub async fn finish<C: ConnectionTrait>(
    db: &C,
    id: &IngestionJobId,
    status: JobStatus,
    records_written: i64,
    last_error: Option<&str>,
) -> Result<bool> {
    if !JobStatus::Running.can_transition_to(status) {
        anyhow::bail!("Job {} cannot finish as {}", id.value(), status);
    }
    let result = Entity::update_many()
        .col_expr(Column::Status, Expr::value(status.as_str()))
        .col_expr(Column::RecordsWritten, Expr::value(records_written))
        .col_expr(Column::LastError, Expr::value(last_error.map(|e| e.to_string())))
        .col_expr(Column::FinishedAt, Expr::value(Some(Utc::now())))
        .col_expr(Column::LeaseExpiresAt, Expr::value(Option::<i64>::None))
        .filter(Column::Id.eq(id.as_string()))
        .filter(Column::Status.eq(JobStatus::Running.as_str()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Put a pending job into the delayed set until `available_at_ms`
pub async fn set_delayed<C: ConnectionTrait>(db: &C, id: &IngestionJobId, available_at_ms: i64) -> Result<bool> {
    let result = Entity::update_many()
        .col_expr(Column::Delayed, Expr::value(true))
        .col_expr(Column::AvailableAt, Expr::value(available_at_ms))
        .filter(Column::Id.eq(id.as_string()))
        .filter(Column::Status.eq(JobStatus::Pending.as_str()))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

pub async fn list_due_delayed<C: ConnectionTrait>(db: &C, now_ms: i64) -> Result<Vec<Model>> {
    Ok(Entity::find()
        .filter(Column::Status.eq(JobStatus::Pending.as_str()))
        .filter(Column::Delayed.eq(true))
        .filter(Column::AvailableAt.lte(now_ms))
        .order_by_asc(Column::Seq)
        .all(db)
        .await?)
}

pub async fn release_delayed<C: ConnectionTrait>(db: &C, seqs: Vec<i64>) -> Result<u64> {
    if seqs.is_empty() {
        return Ok(0);
    }
    let result = Entity::update_many()
        .col_expr(Column::Delayed, Expr::value(false))
        .filter(Column::Seq.is_in(seqs))
        .filter(Column::Delayed.eq(true))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Running jobs whose worker lease ran out
pub async fn list_expired_leases<C: ConnectionTrait>(db: &C, now_ms: i64) -> Result<Vec<IngestionJob>> {
    let models = Entity::find()
        .filter(Column::Status.eq(JobStatus::Running.as_str()))
        .filter(Column::LeaseExpiresAt.lt(now_ms))
        .order_by_asc(Column::Seq)
        .all(db)
        .await?;
    into_jobs(models)
}

/// Pending or running job for the pair
pub async fn has_open_job<C: ConnectionTrait>(db: &C, tenant_id: &str, platform: Platform) -> Result<bool> {
    let found = Entity::find()
        .select_only()
        .column(Column::Seq)
        .filter(Column::TenantId.eq(tenant_id))
        .filter(Column::Platform.eq(platform.code()))
        .filter(
            Column::Status.is_in([JobStatus::Pending.as_str(), JobStatus::Running.as_str()]),
        )
        .into_tuple::<i64>()
        .one(db)
        .await?;
    Ok(found.is_some())
}

/// Newest first
pub async fn list_for_tenant<C: ConnectionTrait>(
    db: &C,
    tenant_id: &str,
    status: Option<JobStatus>,
    limit: u64,
) -> Result<Vec<IngestionJob>> {
    let mut query = Entity::find().filter(Column::TenantId.eq(tenant_id));
    if let Some(s) = status {
        query = query.filter(Column::Status.eq(s.as_str()));
    }
    let models = query
        .order_by_desc(Column::Seq)
        .limit(limit)
        .all(db)
        .await?;
    into_jobs(models)
}

pub async fn status_counts<C: ConnectionTrait>(db: &C, tenant_id: &str) -> Result<JobStatusSummary> {
    let rows: Vec<(String, i64)> = Entity::find()
        .select_only()
        .column(Column::Status)
        .column_as(Expr::col(Column::Seq).count(), "count")
        .filter(Column::TenantId.eq(tenant_id))
        .group_by(Column::Status)
        .into_tuple()
        .all(db)
        .await?;

    let mut summary = JobStatusSummary::default();
    for (status, count) in rows {
        match JobStatus::from_str_opt(&status) {
            Some(JobStatus::Pending) => summary.pending = count,
            Some(JobStatus::Running) => summary.running = count,
            Some(JobStatus::Succeeded) => summary.succeeded = count,
            Some(JobStatus::Failed) => summary.failed = count,
            None => tracing::warn!("Unknown job status '{}' in summary", status),
        }
    }
    Ok(summary)
}
