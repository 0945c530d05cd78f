use anyhow::Result;
use contracts::system::ingestion_jobs::JobPayload;
use contracts::usecases::u503_ingestion_sweep::SweepResponse;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::domain::a001_platform_connection::repository as connections;
use crate::system::ingestion::JobQueue;

/// Queues a first-page pull for every connected pull platform that has
/// nothing pending or running yet
pub struct IngestionSweep {
    db: DatabaseConnection,
    queue: Arc<JobQueue>,
}

impl IngestionSweep {
    pub fn new(db: DatabaseConnection, queue: Arc<JobQueue>) -> Self {
        Self { db, queue }
    }

    pub async fn run(&self) -> Result<SweepResponse> {
        let mut response = SweepResponse::default();

        for connection in connections::list_connected(&self.db).await? {
            if !connection.platform.is_pull() {
                continue;
            }
            if !connection.is_usable()
                || self.queue.has_open_job(&connection.tenant_id, connection.platform).await?
            {
                response.skipped += 1;
                continue;
            }
            self.queue
                .enqueue(&connection.tenant_id, connection.platform, JobPayload::first_page())
                .await?;
            response.enqueued += 1;
        }

        tracing::info!(
            "Ingestion sweep: {} jobs enqueued, {} connections skipped",
            response.enqueued,
            response.skipped
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a001_platform_connection::repository as conn_repo;
    use crate::shared::data::db::connect_in_memory;
    use contracts::enums::platform::Platform;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweep_skips_open_pairs_and_uploads() {
        let db = connect_in_memory().await;
        let queue = Arc::new(JobQueue::new(db.clone(), Duration::from_secs(600)));
        conn_repo::upsert(&db, "t1", Platform::Gumroad, "a").await.unwrap();
        conn_repo::upsert(&db, "t1", Platform::Payhip, "b").await.unwrap();
        conn_repo::upsert(&db, "t2", Platform::Lulu, "c").await.unwrap();
        conn_repo::upsert(&db, "t2", Platform::AmazonKdp, "n/a").await.unwrap();
        conn_repo::upsert(&db, "t3", Platform::Gumroad, "d").await.unwrap();
        conn_repo::mark_error(&db, "t3", Platform::Gumroad, "expired").await.unwrap();

        let sweep = IngestionSweep::new(db.clone(), queue.clone());
        let first = sweep.run().await.unwrap();
        assert_eq!(first, SweepResponse { enqueued: 3, skipped: 0 });

        // Nothing finished yet, so every pair is still open
        let second = sweep.run().await.unwrap();
        assert_eq!(second, SweepResponse { enqueued: 0, skipped: 3 });

        assert!(!queue.has_open_job("t3", Platform::Gumroad).await.unwrap());
        assert!(!queue.has_open_job("t2", Platform::AmazonKdp).await.unwrap());
    }
}
