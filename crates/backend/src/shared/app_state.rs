use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::shared::config::Config;
use crate::shared::platforms::AdapterRegistry;
use crate::system::ingestion::{IngestionOrchestrator, JobQueue, RetryPolicy};
use crate::usecases::u501_webhook_receiver::WebhookReceiver;
use crate::usecases::u502_csv_upload::CsvUploadExecutor;
use crate::usecases::u503_ingestion_sweep::IngestionSweep;
use crate::usecases::u504_daily_analytics::DailyAnalytics;

/// Everything the handlers and background loops share; built once in
/// `main` and handed out as cheap clones
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<Config>,
    pub queue: Arc<JobQueue>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    pub webhooks: Arc<WebhookReceiver>,
    pub uploads: Arc<CsvUploadExecutor>,
    pub sweep: Arc<IngestionSweep>,
    pub analytics: Arc<DailyAnalytics>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config, registry: AdapterRegistry) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(registry);
        let queue = Arc::new(JobQueue::new(db.clone(), config.ingestion.visibility_timeout()));

        let orchestrator = Arc::new(IngestionOrchestrator::new(
            db.clone(),
            queue.clone(),
            registry.clone(),
            RetryPolicy::from_config(&config.ingestion),
            config.ingestion.http_timeout(),
        ));
        let webhooks = Arc::new(WebhookReceiver::new(
            db.clone(),
            registry,
            queue.clone(),
            config.webhooks.clone(),
        ));
        let uploads = Arc::new(CsvUploadExecutor::new(
            db.clone(),
            queue.clone(),
            config.ingestion.max_upload_bytes,
        ));
        let sweep = Arc::new(IngestionSweep::new(db.clone(), queue.clone()));
        let analytics = Arc::new(DailyAnalytics::new(db.clone()));

        Self {
            db,
            config,
            queue,
            orchestrator,
            webhooks,
            uploads,
            sweep,
            analytics,
        }
    }
}
