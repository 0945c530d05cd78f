#![allow(clippy::too_many_arguments, clippy::derivable_impls)]

pub mod domain;
pub mod handlers;
pub mod projections;
pub mod routes;
pub mod shared;
pub mod system;
pub mod usecases;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use axum::http::{header, Method};
    use axum::middleware;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::watch;
    use tower_http::cors::{Any, CorsLayer};

    use crate::shared::app_state::AppState;
    use crate::shared::platforms::AdapterRegistry;
    use crate::system::ingestion::IngestionWorkerPool;
    use crate::system::scheduler::CronScheduler;

    system::tracing::initialize()?;

    let config = shared::config::load_config()?;
    let db_path = shared::config::get_database_path(&config)?;
    let db = shared::data::db::initialize_database(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("db init failed: {e}"))?;

    let registry = AdapterRegistry::with_defaults(&config)?;
    let state = AppState::new(db, config, registry);

    // Флаг остановки для фоновых задач
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ingestion = &state.config.ingestion;
    let pool = IngestionWorkerPool::new(
        Arc::clone(&state.queue),
        Arc::clone(&state.orchestrator),
        ingestion.workers,
        ingestion.poll_interval(),
        ingestion.max_attempts,
    );
    let mut background = pool.spawn(shutdown_rx.clone());

    if state.config.schedule.enabled {
        let scheduler = CronScheduler::new(
            &state.config.schedule,
            Arc::clone(&state.sweep),
            Arc::clone(&state.analytics),
        )?;
        let rx = shutdown_rx.clone();
        background.push(tokio::spawn(async move { scheduler.run_loop(rx).await }));
    } else {
        tracing::info!("In-process scheduler disabled");
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION]);

    let server = &state.config.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server address {}:{}: {}", server.host, server.port, e))?;

    let app = routes::configure_routes(state.clone())
        .layer(middleware::from_fn(system::middleware::request_logger))
        .layer(cors);

    tracing::info!("Attempting to bind server to http://{}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            tracing::info!("Server successfully bound to {}", addr);
            listener
        }
        Err(e) => {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                tracing::error!(
                    "Error: Port {} is already in use. Please ensure no other process is using this port.",
                    addr.port()
                );
            } else {
                tracing::error!("Failed to bind to {}. Error: {}", addr, e);
            }
            return Err(e.into());
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for ctrl-c: {}", e);
            }
            tracing::info!("Shutdown requested; finishing in-flight jobs");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for handle in background {
        if let Err(e) = handle.await {
            tracing::error!("Background task ended abnormally: {}", e);
        }
    }
    tracing::info!("Server stopped");

    Ok(())
}
