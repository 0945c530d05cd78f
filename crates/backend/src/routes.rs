use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::shared::app_state::AppState;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Конфигурация всех роутов приложения
pub fn configure_routes(state: AppState) -> Router {
    let upload_limit = state.config.ingestion.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // WEBHOOKS (signed by the platforms)
        // ========================================
        .route(
            "/webhooks/platforms/:provider",
            post(handlers::webhooks::receive),
        )
        // ========================================
        // CRON ENTRY POINTS (x-cron-secret)
        // ========================================
        .route(
            "/api/cron/ingestion-sweep",
            post(handlers::cron::ingestion_sweep),
        )
        .route(
            "/api/cron/daily-analytics",
            post(handlers::cron::daily_analytics),
        )
        // A001 Platform connection handlers
        .route(
            "/api/tenants/:tenant_id/connections",
            get(handlers::a001_platform_connection::list_for_tenant),
        )
        .route(
            "/api/tenants/:tenant_id/connections/:platform",
            get(handlers::a001_platform_connection::get_one)
                .put(handlers::a001_platform_connection::upsert),
        )
        // CSV uploads
        .route(
            "/api/tenants/:tenant_id/uploads/:platform",
            post(handlers::uploads::upload_csv).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Ingestion jobs
        .route(
            "/api/tenants/:tenant_id/jobs",
            get(handlers::ingestion_jobs::list_for_tenant),
        )
        .route(
            "/api/tenants/:tenant_id/jobs/summary",
            get(handlers::ingestion_jobs::summary),
        )
        .route("/api/jobs/:id", get(handlers::ingestion_jobs::get_by_id))
        .route("/api/jobs/:id/retry", post(handlers::ingestion_jobs::retry))
        // P900 Sales ledger
        .route(
            "/api/tenants/:tenant_id/sales",
            get(handlers::p900_sales_ledger::list_range),
        )
        // P901 Daily sales
        .route(
            "/api/tenants/:tenant_id/daily-sales",
            get(handlers::p901_daily_sales::list_range),
        )
        .with_state(state)
}
