use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use contracts::domain::common::AggregateId;
use contracts::system::ingestion_jobs::{IngestionJob, IngestionJobId, JobListQuery, JobStatusSummary};

use crate::shared::app_state::AppState;
use crate::system::ingestion::queue::ManualRetry;

const DEFAULT_LIMIT: u64 = 100;
const MAX_LIMIT: u64 = 1000;

fn parse_job_id(id: &str) -> Result<IngestionJobId, StatusCode> {
    IngestionJobId::from_string(id).map_err(|e| {
        tracing::warn!("Bad job id '{}': {}", id, e);
        StatusCode::BAD_REQUEST
    })
}

/// GET /api/tenants/:tenant_id/jobs?status=&limit=
pub async fn list_for_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<JobListQuery>,
) -> Result<Json<Vec<IngestionJob>>, StatusCode> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    match state.queue.list_for_tenant(&tenant_id, query.status, limit).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Failed to list jobs: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/tenants/:tenant_id/jobs/summary
pub async fn summary(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<JobStatusSummary>, StatusCode> {
    match state.queue.status_counts(&tenant_id).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Failed to count jobs: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/jobs/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<IngestionJob>, StatusCode> {
    let id = parse_job_id(&id)?;
    match state.queue.get(&id).await {
        Ok(Some(v)) => Ok(Json(v)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to load job: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/jobs/:id/retry
pub async fn retry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<IngestionJob>), StatusCode> {
    let id = parse_job_id(&id)?;
    match state.queue.retry_failed(&id).await {
        Ok(ManualRetry::Enqueued(job)) => Ok((StatusCode::ACCEPTED, Json(job))),
        Ok(ManualRetry::NotFound) => Err(StatusCode::NOT_FOUND),
        Ok(ManualRetry::NotFailed(status)) => {
            tracing::warn!("Retry refused: job {} is {}", id.value(), status);
            Err(StatusCode::CONFLICT)
        }
        Err(e) => {
            tracing::error!("Failed to retry job: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
