use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use contracts::domain::a001_platform_connection::aggregate::{
    PlatformConnectionView, UpsertConnectionRequest,
};
use contracts::enums::platform::Platform;

use crate::domain::a001_platform_connection::service;
use crate::shared::app_state::AppState;

/// GET /api/tenants/:tenant_id/connections
pub async fn list_for_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Vec<PlatformConnectionView>>, StatusCode> {
    match service::list_views(&state.db, &tenant_id).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Failed to list connections: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /api/tenants/:tenant_id/connections/:platform
pub async fn get_one(
    State(state): State<AppState>,
    Path((tenant_id, platform)): Path<(String, String)>,
) -> Result<Json<PlatformConnectionView>, StatusCode> {
    let platform = Platform::from_code(&platform).ok_or(StatusCode::NOT_FOUND)?;
    match service::get_view(&state.db, &tenant_id, platform).await {
        Ok(Some(v)) => Ok(Json(v)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("Failed to load connection: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// PUT /api/tenants/:tenant_id/connections/:platform
pub async fn upsert(
    State(state): State<AppState>,
    Path((tenant_id, platform)): Path<(String, String)>,
    Json(request): Json<UpsertConnectionRequest>,
) -> Result<Json<PlatformConnectionView>, StatusCode> {
    let platform = Platform::from_code(&platform).ok_or(StatusCode::NOT_FOUND)?;
    if request.credential.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    match service::save_credential(&state.db, &tenant_id, platform, request).await {
        Ok(v) => Ok(Json(v)),
        Err(e) => {
            tracing::error!("Failed to save connection: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
