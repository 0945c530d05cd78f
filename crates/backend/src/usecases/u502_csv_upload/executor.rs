use contracts::enums::platform::Platform;
use contracts::system::ingestion_jobs::JobPayload;
use contracts::usecases::u502_csv_upload::UploadAccepted;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::shared::data::upload_storage;
use crate::system::ingestion::JobQueue;

/// Why an upload was turned away before any job existed
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("unknown platform '{0}'")]
    UnknownPlatform(String),
    #[error("{0} does not take CSV uploads")]
    NotUploadPlatform(Platform),
    #[error("file is empty")]
    Empty,
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Stores an uploaded CSV export and queues the job that parses it
pub struct CsvUploadExecutor {
    db: DatabaseConnection,
    queue: Arc<JobQueue>,
    max_upload_bytes: usize,
}

impl CsvUploadExecutor {
    pub fn new(db: DatabaseConnection, queue: Arc<JobQueue>, max_upload_bytes: usize) -> Self {
        Self {
            db,
            queue,
            max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub async fn accept(
        &self,
        tenant_id: &str,
        platform_code: &str,
        file_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<UploadAccepted, UploadError> {
        let platform = Platform::from_code(platform_code)
            .ok_or_else(|| UploadError::UnknownPlatform(platform_code.to_string()))?;
        if !platform.is_upload() {
            return Err(UploadError::NotUploadPlatform(platform));
        }
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        let upload_id = upload_storage::save_blob(
            &self.db,
            tenant_id,
            platform,
            upload_storage::KIND_CSV_UPLOAD,
            file_name,
            bytes,
        )
        .await?;
        let job_id = self
            .queue
            .enqueue(
                tenant_id,
                platform,
                JobPayload::Upload {
                    upload_id: upload_id.clone(),
                },
            )
            .await?;

        tracing::info!(
            "CSV upload accepted: tenant={}, platform={}, size={}, job={}",
            tenant_id,
            platform,
            bytes.len(),
            job_id.value()
        );

        Ok(UploadAccepted {
            job_id: job_id.value().to_string(),
            upload_id,
            size: bytes.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::data::db::connect_in_memory;
    use contracts::domain::common::AggregateId;
    use contracts::system::ingestion_jobs::{IngestionJobId, JobStatus};
    use std::time::Duration;

    async fn executor(limit: usize) -> (CsvUploadExecutor, Arc<JobQueue>) {
        let db = connect_in_memory().await;
        let queue = Arc::new(JobQueue::new(db.clone(), Duration::from_secs(600)));
        (CsvUploadExecutor::new(db, queue.clone(), limit), queue)
    }

    #[tokio::test]
    async fn test_upload_stores_blob_and_queues_job() {
        let (exec, queue) = executor(1024).await;
        let csv = b"Title,Units,Amount,Date\nBook,1,2.00,2024-01-01\n";
        let accepted = exec.accept("t1", "kobo", Some("kobo.csv"), csv).await.unwrap();
        assert_eq!(accepted.size, csv.len() as i64);

        let job_id = IngestionJobId::from_string(&accepted.job_id).unwrap();
        let job = queue.get(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.platform, Platform::Kobo);
        assert_eq!(
            job.payload,
            JobPayload::Upload {
                upload_id: accepted.upload_id.clone()
            }
        );

        let blob = upload_storage::get_blob(&exec.db, &accepted.upload_id).await.unwrap().unwrap();
        assert_eq!(blob.bytes, csv.to_vec());
        assert_eq!(blob.file_name.as_deref(), Some("kobo.csv"));
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let (exec, _) = executor(8).await;
        assert!(matches!(
            exec.accept("t1", "gumroad", None, b"a").await,
            Err(UploadError::NotUploadPlatform(Platform::Gumroad))
        ));
        assert!(matches!(
            exec.accept("t1", "nope", None, b"a").await,
            Err(UploadError::UnknownPlatform(_))
        ));
        assert!(matches!(exec.accept("t1", "kobo", None, b"").await, Err(UploadError::Empty)));
        assert!(matches!(
            exec.accept("t1", "kobo", None, b"0123456789").await,
            Err(UploadError::TooLarge { size: 10, limit: 8 })
        ));
    }
}
