use anyhow::Result;
use chrono::Utc;
use contracts::enums::platform::Platform;
use contracts::system::ingestion_jobs::{
    IngestionJob, IngestionJobId, JobPayload, JobStatus, JobStatusSummary,
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::time::Duration;

use super::backoff::RetryPolicy;
use super::repository::{self, NewJob};

/// Lost claim races are retried this many times per dequeue
const CLAIM_ATTEMPTS: usize = 3;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Result of a manual retry request
#[derive(Debug)]
pub enum ManualRetry {
    Enqueued(IngestionJob),
    NotFound,
    NotFailed(JobStatus),
}

/// Durable job queue over `sys_ingestion_jobs`.
///
/// Every status change is a guarded update (`WHERE status = <expected>`),
/// so two workers can never both move the same job.
#[derive(Clone)]
pub struct JobQueue {
    db: DatabaseConnection,
    visibility_timeout: Duration,
}

impl JobQueue {
    pub fn new(db: DatabaseConnection, visibility_timeout: Duration) -> Self {
        Self {
            db,
            visibility_timeout,
        }
    }

    pub async fn enqueue(
        &self,
        tenant_id: &str,
        platform: Platform,
        payload: JobPayload,
    ) -> Result<IngestionJobId> {
        let job = repository::insert(
            &self.db,
            NewJob {
                tenant_id,
                platform,
                payload: &payload,
                attempt: 1,
                parent_job_id: None,
                available_at_ms: now_ms(),
                delayed: false,
            },
        )
        .await?;
        tracing::info!(
            "Job {} queued: tenant={}, platform={}, payload={:?}",
            job.id.value(),
            tenant_id,
            platform,
            payload
        );
        Ok(job.id)
    }

    /// Enqueue straight into the delayed set
    pub async fn enqueue_delayed(
        &self,
        tenant_id: &str,
        platform: Platform,
        payload: JobPayload,
        delay: Duration,
    ) -> Result<IngestionJobId> {
        let job = repository::insert(
            &self.db,
            NewJob {
                tenant_id,
                platform,
                payload: &payload,
                attempt: 1,
                parent_job_id: None,
                available_at_ms: now_ms() + duration_ms(delay),
                delayed: true,
            },
        )
        .await?;
        Ok(job.id)
    }

    /// Move a pending job into the delayed set, due `delay_ms` from now
    pub async fn schedule_delayed(&self, job_id: &IngestionJobId, delay_ms: i64) -> Result<bool> {
        repository::set_delayed(&self.db, job_id, now_ms() + delay_ms.max(0)).await
    }

    /// Release delayed jobs whose time has come into the ready set
    pub async fn poll_due(&self) -> Result<Vec<IngestionJob>> {
        let txn = self.db.begin().await?;
        let due = repository::list_due_delayed(&txn, now_ms()).await?;
        let seqs: Vec<i64> = due.iter().map(|m| m.seq).collect();
        repository::release_delayed(&txn, seqs).await?;
        txn.commit().await?;

        let mut released = Vec::with_capacity(due.len());
        for mut model in due {
            model.delayed = false;
            released.push(IngestionJob::try_from(model)?);
        }
        if !released.is_empty() {
            tracing::debug!("{} delayed job(s) became due", released.len());
        }
        Ok(released)
    }

    /// Atomically claim the next runnable job and mark it `running`
    pub async fn dequeue_next(&self) -> Result<Option<IngestionJob>> {
        for _ in 0..CLAIM_ATTEMPTS {
            let txn = self.db.begin().await?;
            let Some(candidate) = repository::find_claimable(&txn, now_ms()).await? else {
                txn.commit().await?;
                return Ok(None);
            };

            let now = Utc::now();
            let lease_until = now.timestamp_millis() + duration_ms(self.visibility_timeout);
            if repository::start(&txn, &candidate.id, now, lease_until).await? {
                txn.commit().await?;
                let mut job = IngestionJob::try_from(candidate)?;
                job.status = JobStatus::Running;
                job.last_attempted_at = Some(now);
                return Ok(Some(job));
            }
            // someone else claimed it first
            txn.rollback().await?;
        }
        Ok(None)
    }

    /// pending → running for a specific job
    pub async fn mark_running(&self, job_id: &IngestionJobId) -> Result<bool> {
        let now = Utc::now();
        let lease_until = now.timestamp_millis() + duration_ms(self.visibility_timeout);
        repository::start(&self.db, &job_id.value().to_string(), now, lease_until).await
    }

    pub async fn mark_succeeded(&self, job_id: &IngestionJobId, records_written: i64) -> Result<bool> {
        repository::finish(&self.db, job_id, JobStatus::Succeeded, records_written, None).await
    }

    pub async fn mark_failed(&self, job_id: &IngestionJobId, error: &str) -> Result<bool> {
        repository::finish(&self.db, job_id, JobStatus::Failed, 0, Some(error)).await
    }

    /// Finish a page and queue the next one in the same transaction, so a
    /// crash never loses the cursor.
    pub async fn succeed_and_continue(
        &self,
        job: &IngestionJob,
        records_written: i64,
        next_payload: JobPayload,
    ) -> Result<IngestionJobId> {
        let txn = self.db.begin().await?;
        if !repository::finish(&txn, &job.id, JobStatus::Succeeded, records_written, None).await? {
            txn.rollback().await?;
            anyhow::bail!("Job {} is no longer running", job.id.value());
        }
        let next = repository::insert(
            &txn,
            NewJob {
                tenant_id: &job.tenant_id,
                platform: job.platform,
                payload: &next_payload,
                attempt: 1,
                parent_job_id: Some(job.id),
                available_at_ms: now_ms(),
                delayed: false,
            },
        )
        .await?;
        txn.commit().await?;
        Ok(next.id)
    }

    /// Fail the job and, while the budget lasts, queue attempt+1 in the
    /// delayed set. Returns the follow-up job and its delay.
    pub async fn fail_and_retry(
        &self,
        job: &IngestionJob,
        error: &str,
        policy: &RetryPolicy,
    ) -> Result<Option<(IngestionJobId, Duration)>> {
        let txn = self.db.begin().await?;
        if !repository::finish(&txn, &job.id, JobStatus::Failed, 0, Some(error)).await? {
            txn.rollback().await?;
            anyhow::bail!("Job {} is no longer running", job.id.value());
        }

        if !policy.should_retry(job.attempt) {
            txn.commit().await?;
            return Ok(None);
        }

        let delay = policy.delay_after(job.attempt);
        let retry = repository::insert(
            &txn,
            NewJob {
                tenant_id: &job.tenant_id,
                platform: job.platform,
                payload: &job.payload,
                attempt: job.attempt + 1,
                parent_job_id: Some(job.id),
                available_at_ms: now_ms(),
                delayed: false,
            },
        )
        .await?;
        repository::set_delayed(&txn, &retry.id, now_ms() + duration_ms(delay)).await?;
        txn.commit().await?;

        Ok(Some((retry.id, delay)))
    }

    /// Fail jobs whose worker vanished mid-run and queue their next attempt
    pub async fn reclaim_stale(&self, max_attempts: i32) -> Result<usize> {
        let expired = repository::list_expired_leases(&self.db, now_ms()).await?;
        let mut reclaimed = 0;

        for job in expired {
            let txn = self.db.begin().await?;
            if !repository::finish(&txn, &job.id, JobStatus::Failed, 0, Some("worker lease expired"))
                .await?
            {
                txn.rollback().await?;
                continue;
            }
            if job.attempt < max_attempts {
                repository::insert(
                    &txn,
                    NewJob {
                        tenant_id: &job.tenant_id,
                        platform: job.platform,
                        payload: &job.payload,
                        attempt: job.attempt + 1,
                        parent_job_id: Some(job.id),
                        available_at_ms: now_ms(),
                        delayed: false,
                    },
                )
                .await?;
            }
            txn.commit().await?;

            tracing::warn!(
                "Job {} (tenant={}, platform={}) lease expired; reclaimed",
                job.id.value(),
                job.tenant_id,
                job.platform
            );
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    /// Manual retry of a failed job: a fresh chain starting at attempt 1
    pub async fn retry_failed(&self, job_id: &IngestionJobId) -> Result<ManualRetry> {
        let Some(job) = repository::get(&self.db, job_id).await? else {
            return Ok(ManualRetry::NotFound);
        };
        if job.status != JobStatus::Failed {
            return Ok(ManualRetry::NotFailed(job.status));
        }
        let retry = repository::insert(
            &self.db,
            NewJob {
                tenant_id: &job.tenant_id,
                platform: job.platform,
                payload: &job.payload,
                attempt: 1,
                parent_job_id: Some(job.id),
                available_at_ms: now_ms(),
                delayed: false,
            },
        )
        .await?;
        tracing::info!("Job {} manually retried as {}", job_id.value(), retry.id.value());
        Ok(ManualRetry::Enqueued(retry))
    }

    pub async fn has_open_job(&self, tenant_id: &str, platform: Platform) -> Result<bool> {
        repository::has_open_job(&self.db, tenant_id, platform).await
    }

    pub async fn get(&self, job_id: &IngestionJobId) -> Result<Option<IngestionJob>> {
        repository::get(&self.db, job_id).await
    }

    pub async fn list_for_tenant(
        &self,
        tenant_id: &str,
        status: Option<JobStatus>,
        limit: u64,
    ) -> Result<Vec<IngestionJob>> {
        repository::list_for_tenant(&self.db, tenant_id, status, limit).await
    }

    pub async fn status_counts(&self, tenant_id: &str) -> Result<JobStatusSummary> {
        repository::status_counts(&self.db, tenant_id).await
    }
}
