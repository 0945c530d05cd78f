use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use contracts::usecases::u503_ingestion_sweep::SweepResponse;
use contracts::usecases::u504_daily_analytics::{DailyAnalyticsRequest, DailyAnalyticsResponse};

use crate::shared::app_state::AppState;

const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Constant-time comparison against the configured secret.
/// No secret configured means the endpoints are closed.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let expected = state
        .config
        .cron
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    let given = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if constant_time_eq(expected.as_bytes(), given.as_bytes()) {
        Ok(())
    } else {
        tracing::warn!("Cron call with a wrong secret");
        Err(StatusCode::UNAUTHORIZED)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// POST /api/cron/ingestion-sweep
pub async fn ingestion_sweep(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepResponse>, StatusCode> {
    authorize(&state, &headers)?;
    match state.sweep.run().await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Ingestion sweep failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /api/cron/daily-analytics, optional body `{ "day": "YYYY-MM-DD" }`
pub async fn daily_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Option<Json<DailyAnalyticsRequest>>,
) -> Result<Json<DailyAnalyticsResponse>, StatusCode> {
    authorize(&state, &headers)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();
    match state.analytics.run(request).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Daily analytics failed: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cret-longer"));
    }
}
