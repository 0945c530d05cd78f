use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use contracts::projections::p901_daily_sales::dto::{DailySalesQuery, DailySalesSummary};

use crate::projections::p901_daily_sales::repository;
use crate::shared::app_state::AppState;

/// GET /api/tenants/:tenant_id/daily-sales?from=&to=
pub async fn list_range(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<DailySalesQuery>,
) -> Result<Json<Vec<DailySalesSummary>>, StatusCode> {
    if query.from > query.to {
        return Err(StatusCode::BAD_REQUEST);
    }
    match repository::list_range(&state.db, &tenant_id, query.from, query.to).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Failed to query daily sales: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
