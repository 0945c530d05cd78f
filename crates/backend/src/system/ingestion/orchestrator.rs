use contracts::enums::platform::Platform;
use contracts::shared::normalized_record::NormalizedSaleRecord;
use contracts::system::ingestion_jobs::{IngestionJob, IngestionJobId, JobPayload};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use super::backoff::RetryPolicy;
use super::queue::JobQueue;
use crate::domain::a001_platform_connection::repository as connections;
use crate::projections::p900_sales_ledger::repository as ledger;
use crate::shared::data::upload_storage;
use crate::shared::platforms::{AdapterError, AdapterRegistry};

/// What happened to one job; every adapter failure ends up here as a
/// job transition, never as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded {
        records_written: i64,
    },
    /// Page done, next page queued
    Continued {
        records_written: i64,
        next_job_id: IngestionJobId,
    },
    /// Failed transiently, attempt+1 is in the delayed set
    RetryScheduled {
        next_job_id: IngestionJobId,
        delay: Duration,
        error: String,
    },
    Failed {
        error: String,
    },
    /// The final status write itself failed; the job stays `running` until
    /// its lease expires and it is reclaimed.
    Abandoned {
        error: String,
    },
}

enum JobError {
    Adapter(AdapterError),
    /// Nothing to retry: missing connection, blob or adapter
    Permanent(String),
    /// Store failure mid-job, retried like a network blip
    Storage(anyhow::Error),
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::Storage(e)
    }
}

struct Executed {
    records_written: i64,
    next_cursor: Option<String>,
}

/// Drives a claimed job through its adapter into the ledger
pub struct IngestionOrchestrator {
    db: DatabaseConnection,
    queue: Arc<JobQueue>,
    registry: Arc<AdapterRegistry>,
    policy: RetryPolicy,
    fetch_timeout: Duration,
}

impl IngestionOrchestrator {
    pub fn new(
        db: DatabaseConnection,
        queue: Arc<JobQueue>,
        registry: Arc<AdapterRegistry>,
        policy: RetryPolicy,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            db,
            queue,
            registry,
            policy,
            fetch_timeout,
        }
    }

    /// Run a job already claimed as `running`
    pub async fn run_job(&self, job: &IngestionJob) -> JobOutcome {
        tracing::info!(
            "Job {} started: tenant={}, platform={}, attempt={}",
            job.id.value(),
            job.tenant_id,
            job.platform,
            job.attempt
        );

        let outcome = match self.execute(job).await {
            Ok(done) => self.complete(job, done).await,
            Err(err) => self.handle_error(job, err).await,
        };

        match &outcome {
            JobOutcome::Failed { error } | JobOutcome::Abandoned { error } => {
                tracing::error!("Job {} failed: {}", job.id.value(), error)
            }
            JobOutcome::RetryScheduled { delay, error, .. } => tracing::warn!(
                "Job {} failed transiently ({}); retry in {:?}",
                job.id.value(),
                error,
                delay
            ),
            other => tracing::info!("Job {} finished: {:?}", job.id.value(), other),
        }
        outcome
    }

    async fn execute(&self, job: &IngestionJob) -> Result<Executed, JobError> {
        let (records, next_cursor) = match &job.payload {
            JobPayload::Pull { cursor } => self.fetch_page(job, cursor.as_deref()).await?,
            JobPayload::Upload { upload_id } => (self.parse_upload(job, upload_id).await?, None),
        };

        let source = format!("job:{}", job.id.value());
        let records_written =
            ledger::insert_records(&self.db, &job.tenant_id, job.platform, &records, &source).await?;

        tracing::info!(
            "Job {}: {} records, {} new in ledger",
            job.id.value(),
            records.len(),
            records_written
        );
        Ok(Executed {
            records_written,
            next_cursor,
        })
    }

    async fn fetch_page(
        &self,
        job: &IngestionJob,
        cursor: Option<&str>,
    ) -> Result<(Vec<NormalizedSaleRecord>, Option<String>), JobError> {
        let connection = connections::get(&self.db, &job.tenant_id, job.platform)
            .await?
            .ok_or_else(|| JobError::Permanent("no connection for this platform".to_string()))?;
        if !connection.is_usable() {
            return Err(JobError::Permanent(format!(
                "connection is not usable (status {})",
                connection.status.as_str()
            )));
        }
        let adapter = self
            .registry
            .pull(job.platform)
            .ok_or_else(|| JobError::Permanent(format!("no pull adapter for {}", job.platform)))?;

        match tokio::time::timeout(self.fetch_timeout, adapter.fetch(&connection, cursor)).await {
            Err(_) => Err(JobError::Adapter(AdapterError::TransientNetwork(format!(
                "fetch timed out after {:?}",
                self.fetch_timeout
            )))),
            Ok(Err(e)) => Err(JobError::Adapter(e)),
            Ok(Ok(page)) => Ok((page.records, page.next_cursor)),
        }
    }

    async fn parse_upload(
        &self,
        job: &IngestionJob,
        upload_id: &str,
    ) -> Result<Vec<NormalizedSaleRecord>, JobError> {
        let blob = upload_storage::get_blob(&self.db, upload_id)
            .await?
            .ok_or_else(|| JobError::Permanent(format!("upload {} not found", upload_id)))?;
        let adapter = self
            .registry
            .upload(job.platform)
            .ok_or_else(|| JobError::Permanent(format!("no upload adapter for {}", job.platform)))?;

        // CSV parsing is CPU work; keep it off the async workers
        let report = tokio::task::spawn_blocking(move || adapter.parse(&blob.bytes))
            .await
            .map_err(|e| JobError::Permanent(format!("parser task failed: {}", e)))?
            .map_err(JobError::Adapter)?;

        if report.skipped_rows > 0 {
            tracing::warn!(
                "Job {}: skipped {} malformed rows ({})",
                job.id.value(),
                report.skipped_rows,
                report.warnings.iter().take(5).cloned().collect::<Vec<_>>().join("; ")
            );
        }
        Ok(report.records)
    }

    async fn complete(&self, job: &IngestionJob, done: Executed) -> JobOutcome {
        match done.next_cursor {
            Some(cursor) => match self
                .queue
                .succeed_and_continue(job, done.records_written, job.payload.with_cursor(cursor))
                .await
            {
                Ok(next_job_id) => JobOutcome::Continued {
                    records_written: done.records_written,
                    next_job_id,
                },
                Err(e) => JobOutcome::Abandoned {
                    error: e.to_string(),
                },
            },
            None => match self.queue.mark_succeeded(&job.id, done.records_written).await {
                Ok(true) => {
                    if matches!(job.payload, JobPayload::Pull { .. }) {
                        if let Err(e) = connections::mark_synced(
                            &self.db,
                            &job.tenant_id,
                            job.platform,
                            chrono::Utc::now(),
                        )
                        .await
                        {
                            tracing::error!("Failed to record sync time: {}", e);
                        }
                    }
                    JobOutcome::Succeeded {
                        records_written: done.records_written,
                    }
                }
                Ok(false) => JobOutcome::Abandoned {
                    error: "job was no longer running".to_string(),
                },
                Err(e) => JobOutcome::Abandoned {
                    error: e.to_string(),
                },
            },
        }
    }

    async fn handle_error(&self, job: &IngestionJob, err: JobError) -> JobOutcome {
        match err {
            JobError::Adapter(AdapterError::AuthExpired(reason)) => {
                if let Err(e) =
                    connections::mark_error(&self.db, &job.tenant_id, job.platform, &reason).await
                {
                    tracing::error!("Failed to flag connection as errored: {}", e);
                }
                self.fail(job, format!("auth_expired: {}", reason)).await
            }
            JobError::Adapter(AdapterError::TransientNetwork(reason)) => {
                self.retry(job, format!("transient_network_error: {}", reason)).await
            }
            JobError::Storage(e) => self.retry(job, format!("storage_error: {}", e)).await,
            JobError::Adapter(AdapterError::MalformedInput { reason, raw }) => {
                let mut message = format!("malformed_input: {}", reason);
                if let Some(bytes) = raw {
                    match self.preserve_rejected(job.platform, &job.tenant_id, &bytes).await {
                        Ok(blob_id) => message.push_str(&format!(" (response kept as blob {})", blob_id)),
                        Err(e) => tracing::error!("Failed to keep rejected response: {}", e),
                    }
                }
                self.fail(job, message).await
            }
            JobError::Permanent(reason) => self.fail(job, reason).await,
        }
    }

    async fn preserve_rejected(
        &self,
        platform: Platform,
        tenant_id: &str,
        bytes: &[u8],
    ) -> anyhow::Result<String> {
        upload_storage::save_blob(
            &self.db,
            tenant_id,
            platform,
            upload_storage::KIND_REJECTED_RESPONSE,
            None,
            bytes,
        )
        .await
    }

    async fn fail(&self, job: &IngestionJob, error: String) -> JobOutcome {
        match self.queue.mark_failed(&job.id, &error).await {
            Ok(true) => JobOutcome::Failed { error },
            Ok(false) => JobOutcome::Abandoned {
                error: format!("job was no longer running: {}", error),
            },
            Err(e) => JobOutcome::Abandoned {
                error: format!("{} (and marking failed: {})", error, e),
            },
        }
    }

    async fn retry(&self, job: &IngestionJob, error: String) -> JobOutcome {
        match self.queue.fail_and_retry(job, &error, &self.policy).await {
            Ok(Some((next_job_id, delay))) => JobOutcome::RetryScheduled {
                next_job_id,
                delay,
                error,
            },
            Ok(None) => JobOutcome::Failed {
                error: format!("{} (gave up after {} attempts)", error, job.attempt),
            },
            Err(e) => JobOutcome::Abandoned {
                error: format!("{} (and scheduling retry: {})", error, e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a001_platform_connection::repository as conn_repo;
    use crate::shared::data::db::connect_in_memory;
    use crate::shared::platforms::csv_report::{CsvLayout, CsvReportAdapter};
    use crate::shared::platforms::{FetchPage, PullAdapter};
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, TimeZone, Utc};
    use contracts::domain::a001_platform_connection::aggregate::{ConnectionStatus, PlatformConnection};
    use contracts::system::ingestion_jobs::JobStatus;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// Scripted pull adapter: pages keyed by cursor, plus queued failures
    struct FakePull {
        platform: Platform,
        pages: Vec<(Option<&'static str>, Vec<&'static str>, Option<&'static str>)>,
        failures: Mutex<Vec<AdapterError>>,
        calls: Mutex<Vec<Option<String>>>,
        stall: Option<Duration>,
    }

    impl FakePull {
        fn new(platform: Platform) -> Self {
            Self {
                platform,
                pages: Vec::new(),
                failures: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
                stall: None,
            }
        }

        /// Hang for `d` before answering, like a vendor that stops responding
        fn stall_for(mut self, d: Duration) -> Self {
            self.stall = Some(d);
            self
        }

        fn page(mut self, cursor: Option<&'static str>, ids: Vec<&'static str>, next: Option<&'static str>) -> Self {
            self.pages.push((cursor, ids, next));
            self
        }

        fn fail_with(self, errors: Vec<AdapterError>) -> Self {
            *self.failures.lock().unwrap() = errors;
            self
        }
    }

    #[async_trait]
    impl PullAdapter for FakePull {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(
            &self,
            _connection: &PlatformConnection,
            cursor: Option<&str>,
        ) -> Result<FetchPage, AdapterError> {
            self.calls.lock().unwrap().push(cursor.map(|c| c.to_string()));
            if let Some(d) = self.stall {
                tokio::time::sleep(d).await;
            }
            {
                let mut failures = self.failures.lock().unwrap();
                if !failures.is_empty() {
                    return Err(failures.remove(0));
                }
            }
            let (_, ids, next) = self
                .pages
                .iter()
                .find(|(c, _, _)| c.as_deref() == cursor)
                .ok_or_else(|| AdapterError::malformed("unknown cursor"))?;
            let records = ids
                .iter()
                .map(|id| {
                    NormalizedSaleRecord::sale(
                        Some(id.to_string()),
                        "Novel",
                        1,
                        BigDecimal::from_str("4.99").unwrap(),
                        "USD",
                        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
                        serde_json::json!({ "id": id }),
                    )
                })
                .collect();
            Ok(FetchPage {
                records,
                next_cursor: next.map(|n| n.to_string()),
            })
        }
    }

    struct Harness {
        db: DatabaseConnection,
        queue: Arc<JobQueue>,
        orchestrator: IngestionOrchestrator,
    }

    async fn harness(registry: AdapterRegistry) -> Harness {
        harness_with_timeout(registry, Duration::from_secs(5)).await
    }

    async fn harness_with_timeout(registry: AdapterRegistry, fetch_timeout: Duration) -> Harness {
        let db = connect_in_memory().await;
        let queue = Arc::new(JobQueue::new(db.clone(), Duration::from_secs(600)));
        let orchestrator = IngestionOrchestrator::new(
            db.clone(),
            queue.clone(),
            Arc::new(registry),
            RetryPolicy::default(),
            fetch_timeout,
        );
        Harness {
            db,
            queue,
            orchestrator,
        }
    }

    async fn run_next(h: &Harness) -> Option<(IngestionJob, JobOutcome)> {
        let job = h.queue.dequeue_next().await.unwrap()?;
        let outcome = h.orchestrator.run_job(&job).await;
        Some((job, outcome))
    }

    async fn ledger_count(h: &Harness, tenant: &str) -> u64 {
        ledger::count_for_tenant(&h.db, tenant).await.unwrap()
    }

    #[tokio::test]
    async fn test_single_page_success() {
        let mut registry = AdapterRegistry::new();
        registry.register_pull(FakePull::new(Platform::Gumroad).page(None, vec!["a", "b"], None));
        let h = harness(registry).await;
        conn_repo::upsert(&h.db, "t1", Platform::Gumroad, "tok").await.unwrap();
        h.queue.enqueue("t1", Platform::Gumroad, JobPayload::first_page()).await.unwrap();

        let (job, outcome) = run_next(&h).await.unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded { records_written: 2 });
        let stored = h.queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Succeeded);
        assert_eq!(stored.records_written, 2);
        assert_eq!(ledger_count(&h, "t1").await, 2);
    }

    #[tokio::test]
    async fn test_auth_expired_flags_connection_without_retry() {
        let mut registry = AdapterRegistry::new();
        registry.register_pull(
            FakePull::new(Platform::Payhip)
                .fail_with(vec![AdapterError::AuthExpired("401 invalid key".into())]),
        );
        let h = harness(registry).await;
        conn_repo::upsert(&h.db, "t1", Platform::Payhip, "old").await.unwrap();
        h.queue.enqueue("t1", Platform::Payhip, JobPayload::first_page()).await.unwrap();

        let (_, outcome) = run_next(&h).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed { ref error } if error.starts_with("auth_expired")));

        let conn = conn_repo::get(&h.db, "t1", Platform::Payhip).await.unwrap().unwrap();
        assert_eq!(conn.status, ConnectionStatus::Error);
        assert!(conn.synced_at.is_none());
        assert!(!h.queue.has_open_job("t1", Platform::Payhip).await.unwrap());
    }

    #[tokio::test]
    async fn test_final_page_records_sync_time() {
        let mut registry = AdapterRegistry::new();
        registry.register_pull(FakePull::new(Platform::Gumroad).page(None, vec!["a"], None));
        let h = harness(registry).await;
        conn_repo::upsert(&h.db, "t1", Platform::Gumroad, "tok").await.unwrap();
        h.queue.enqueue("t1", Platform::Gumroad, JobPayload::first_page()).await.unwrap();

        let before = Utc::now();
        let (_, outcome) = run_next(&h).await.unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded { records_written: 1 });

        let conn = conn_repo::get(&h.db, "t1", Platform::Gumroad).await.unwrap().unwrap();
        let synced = conn.synced_at.expect("sync time recorded");
        assert!(synced >= before);
    }

    #[tokio::test]
    async fn test_transient_failures_exhaust_budget() {
        let errors = (0..5)
            .map(|i| AdapterError::TransientNetwork(format!("503 #{}", i)))
            .collect();
        let mut registry = AdapterRegistry::new();
        registry.register_pull(
            FakePull::new(Platform::Lulu)
                .page(None, vec!["x"], None)
                .fail_with(errors),
        );
        let h = harness(registry).await;
        conn_repo::upsert(&h.db, "t1", Platform::Lulu, "tok").await.unwrap();
        h.queue.enqueue("t1", Platform::Lulu, JobPayload::first_page()).await.unwrap();

        let mut expected_delay = Duration::from_secs(30);
        for attempt in 1..=4 {
            let (job, outcome) = run_next(&h).await.unwrap();
            assert_eq!(job.attempt, attempt);
            match outcome {
                JobOutcome::RetryScheduled { next_job_id, delay, .. } => {
                    assert_eq!(delay, expected_delay);
                    let next = h.queue.get(&next_job_id).await.unwrap().unwrap();
                    assert!(next.delayed);
                    assert_eq!(next.parent_job_id, Some(job.id));
                    // Not visible until due
                    assert!(h.queue.dequeue_next().await.unwrap().is_none());
                    h.queue.schedule_delayed(&next_job_id, 0).await.unwrap();
                    assert_eq!(h.queue.poll_due().await.unwrap().len(), 1);
                }
                other => panic!("attempt {}: unexpected {:?}", attempt, other),
            }
            expected_delay *= 2;
        }

        let (last, outcome) = run_next(&h).await.unwrap();
        assert_eq!(last.attempt, 5);
        assert!(matches!(outcome, JobOutcome::Failed { .. }));
        // No sixth job
        assert!(h.queue.dequeue_next().await.unwrap().is_none());
        assert!(!h.queue.has_open_job("t1", Platform::Lulu).await.unwrap());
        let summary = h.queue.status_counts("t1").await.unwrap();
        assert_eq!(summary.failed, 5);
        assert_eq!(ledger_count(&h, "t1").await, 0);
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_retried_as_transient() {
        let mut registry = AdapterRegistry::new();
        registry.register_pull(
            FakePull::new(Platform::Payhip)
                .page(None, vec!["late"], None)
                .stall_for(Duration::from_secs(10)),
        );
        let h = harness_with_timeout(registry, Duration::from_millis(50)).await;
        conn_repo::upsert(&h.db, "t1", Platform::Payhip, "key").await.unwrap();
        h.queue.enqueue("t1", Platform::Payhip, JobPayload::first_page()).await.unwrap();

        let started = std::time::Instant::now();
        let (job, outcome) = run_next(&h).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        match outcome {
            JobOutcome::RetryScheduled {
                next_job_id,
                delay,
                error,
            } => {
                assert!(error.starts_with("transient_network_error:"), "{}", error);
                assert!(error.contains("timed out"), "{}", error);
                assert_eq!(delay, Duration::from_secs(30));
                let next = h.queue.get(&next_job_id).await.unwrap().unwrap();
                assert_eq!(next.attempt, 2);
                assert_eq!(next.payload, job.payload);
            }
            other => panic!("unexpected {:?}", other),
        }
        let stored = h.queue.get(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(ledger_count(&h, "t1").await, 0);
    }

    #[tokio::test]
    async fn test_malformed_response_is_kept_and_not_retried() {
        let mut registry = AdapterRegistry::new();
        registry.register_pull(
            FakePull::new(Platform::Gumroad)
                .fail_with(vec![AdapterError::malformed_with_raw("not json", b"<html>oops</html>")]),
        );
        let h = harness(registry).await;
        conn_repo::upsert(&h.db, "t1", Platform::Gumroad, "tok").await.unwrap();
        h.queue.enqueue("t1", Platform::Gumroad, JobPayload::first_page()).await.unwrap();

        let (job, outcome) = run_next(&h).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed { .. }));
        assert!(h.queue.dequeue_next().await.unwrap().is_none());

        let stored = h.queue.get(&job.id).await.unwrap().unwrap();
        let error = stored.last_error.unwrap();
        assert!(error.starts_with("malformed_input"));
        let blob_id = error.rsplit(' ').next().unwrap().trim_end_matches(')');
        let blob = upload_storage::get_blob(&h.db, blob_id).await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"<html>oops</html>".to_vec());
        assert_eq!(blob.kind, upload_storage::KIND_REJECTED_RESPONSE);
    }

    #[tokio::test]
    async fn test_missing_connection_fails_permanently() {
        let mut registry = AdapterRegistry::new();
        registry.register_pull(FakePull::new(Platform::Gumroad));
        let h = harness(registry).await;
        h.queue.enqueue("t1", Platform::Gumroad, JobPayload::first_page()).await.unwrap();

        let (_, outcome) = run_next(&h).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                error: "no connection for this platform".into()
            }
        );
    }

    #[tokio::test]
    async fn test_pagination_resumes_from_cursor() {
        let pages = || {
            FakePull::new(Platform::Payhip)
                .page(None, vec!["p1-a", "p1-b"], Some("2"))
                .page(Some("2"), vec!["p2-a", "p2-b"], Some("3"))
                .page(Some("3"), vec!["p3-a"], None)
        };

        // First run: process page 1, then "crash" before page 2 runs
        let mut registry = AdapterRegistry::new();
        registry.register_pull(pages());
        let h = harness(registry).await;
        conn_repo::upsert(&h.db, "t1", Platform::Payhip, "tok").await.unwrap();
        h.queue.enqueue("t1", Platform::Payhip, JobPayload::first_page()).await.unwrap();

        let (first, outcome) = run_next(&h).await.unwrap();
        // Mid-chain pages do not count as a completed sync
        let conn = conn_repo::get(&h.db, "t1", Platform::Payhip).await.unwrap().unwrap();
        assert!(conn.synced_at.is_none());
        let next_job_id = match outcome {
            JobOutcome::Continued {
                records_written,
                next_job_id,
            } => {
                assert_eq!(records_written, 2);
                next_job_id
            }
            other => panic!("unexpected {:?}", other),
        };
        let continuation = h.queue.get(&next_job_id).await.unwrap().unwrap();
        assert_eq!(continuation.payload, JobPayload::Pull { cursor: Some("2".into()) });
        assert_eq!(continuation.parent_job_id, Some(first.id));
        assert_eq!(continuation.attempt, 1);

        // Restart: a fresh orchestrator over the same store picks up at page 2
        let mut registry = AdapterRegistry::new();
        registry.register_pull(pages());
        let restarted = IngestionOrchestrator::new(
            h.db.clone(),
            h.queue.clone(),
            Arc::new(registry),
            RetryPolicy::default(),
            Duration::from_secs(5),
        );
        let mut cursors = Vec::new();
        while let Some(job) = h.queue.dequeue_next().await.unwrap() {
            if let JobPayload::Pull { cursor } = &job.payload {
                cursors.push(cursor.clone());
            }
            restarted.run_job(&job).await;
        }

        assert_eq!(cursors, vec![Some("2".to_string()), Some("3".to_string())]);
        // 5 distinct records, none lost and none duplicated
        assert_eq!(ledger_count(&h, "t1").await, 5);
    }

    #[tokio::test]
    async fn test_rerun_of_same_page_writes_nothing_new() {
        let mut registry = AdapterRegistry::new();
        registry.register_pull(FakePull::new(Platform::Gumroad).page(None, vec!["a", "b"], None));
        let h = harness(registry).await;
        conn_repo::upsert(&h.db, "t1", Platform::Gumroad, "tok").await.unwrap();

        h.queue.enqueue("t1", Platform::Gumroad, JobPayload::first_page()).await.unwrap();
        run_next(&h).await.unwrap();
        h.queue.enqueue("t1", Platform::Gumroad, JobPayload::first_page()).await.unwrap();
        let (_, outcome) = run_next(&h).await.unwrap();

        assert_eq!(outcome, JobOutcome::Succeeded { records_written: 0 });
        assert_eq!(ledger_count(&h, "t1").await, 2);
    }

    async fn upload_harness(platform: Platform) -> Harness {
        let mut registry = AdapterRegistry::new();
        registry.register_upload(CsvReportAdapter::new(CsvLayout::for_platform(platform).unwrap()));
        harness(registry).await
    }

    #[tokio::test]
    async fn test_csv_with_bad_rows_inserts_valid_ones() {
        let h = upload_harness(Platform::Draft2digital).await;
        let mut csv = String::from("Title,Units,Amount,Date\n");
        for i in 0..100 {
            csv.push_str(&format!("Book {},1,2.99,2024-02-{:02}\n", i, (i % 28) + 1));
        }
        csv.push_str("Missing Amount,1,,2024-02-01\n");
        csv.push_str(",2,5.00,2024-02-01\n");
        csv.push_str("Missing Date,1,3.00,\n");

        let upload_id = upload_storage::save_blob(
            &h.db,
            "t1",
            Platform::Draft2digital,
            upload_storage::KIND_CSV_UPLOAD,
            Some("d2d.csv"),
            csv.as_bytes(),
        )
        .await
        .unwrap();
        h.queue
            .enqueue("t1", Platform::Draft2digital, JobPayload::Upload { upload_id })
            .await
            .unwrap();

        let (_, outcome) = run_next(&h).await.unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded { records_written: 100 });
        assert_eq!(ledger_count(&h, "t1").await, 100);
    }

    #[tokio::test]
    async fn test_kdp_upload_uses_fingerprint_keys() {
        let h = upload_harness(Platform::AmazonKdp).await;
        let csv = "ASIN,Title,Units Sold,Royalties,Date\n\
                   B0001,First Book,2,6.98,2024-03-01\n\
                   B0002,Second Book,1,3.49,2024-03-01\n";
        let upload_id = upload_storage::save_blob(
            &h.db,
            "t1",
            Platform::AmazonKdp,
            upload_storage::KIND_CSV_UPLOAD,
            Some("kdp.csv"),
            csv.as_bytes(),
        )
        .await
        .unwrap();
        h.queue
            .enqueue("t1", Platform::AmazonKdp, JobPayload::Upload { upload_id })
            .await
            .unwrap();

        let (_, outcome) = run_next(&h).await.unwrap();
        assert_eq!(outcome, JobOutcome::Succeeded { records_written: 2 });

        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let events = ledger::list_range(&h.db, "t1", day, day, None).await.unwrap();
        assert_eq!(events.len(), 2);
        for event in &events {
            assert_eq!(event.platform, Platform::AmazonKdp);
            assert!(event.platform_txn_id.is_none());
            assert!(event.natural_key.starts_with("fp:"));
        }
    }

    #[tokio::test]
    async fn test_missing_upload_blob_fails() {
        let h = upload_harness(Platform::Kobo).await;
        h.queue
            .enqueue("t1", Platform::Kobo, JobPayload::Upload { upload_id: "gone".into() })
            .await
            .unwrap();
        let (_, outcome) = run_next(&h).await.unwrap();
        assert!(matches!(outcome, JobOutcome::Failed { ref error } if error.contains("not found")));
    }
}
