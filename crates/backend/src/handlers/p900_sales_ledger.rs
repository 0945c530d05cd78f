use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use contracts::projections::p900_sales_ledger::dto::{SalesEvent, SalesRangeQuery};

use crate::projections::p900_sales_ledger::repository;
use crate::shared::app_state::AppState;

/// GET /api/tenants/:tenant_id/sales?from=&to=&platform=
pub async fn list_range(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<SalesRangeQuery>,
) -> Result<Json<Vec<SalesEvent>>, StatusCode> {
    if query.from > query.to {
        return Err(StatusCode::BAD_REQUEST);
    }
    match repository::list_range(&state.db, &tenant_id, query.from, query.to, query.platform).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Failed to query sales ledger: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
