use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use super::orchestrator::IngestionOrchestrator;
use super::queue::JobQueue;

/// N job workers plus one maintenance loop, all stopped by one watch flag
pub struct IngestionWorkerPool {
    queue: Arc<JobQueue>,
    orchestrator: Arc<IngestionOrchestrator>,
    workers: usize,
    poll_interval: Duration,
    max_attempts: i32,
}

impl IngestionWorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        orchestrator: Arc<IngestionOrchestrator>,
        workers: usize,
        poll_interval: Duration,
        max_attempts: i32,
    ) -> Self {
        Self {
            queue,
            orchestrator,
            workers: workers.max(1),
            poll_interval,
            max_attempts,
        }
    }

    /// Spawn every loop; each exits once `shutdown` turns true
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting {} ingestion workers (poll every {:?})",
            self.workers, self.poll_interval
        );
        let mut handles = Vec::with_capacity(self.workers + 1);

        for worker_id in 0..self.workers {
            let queue = Arc::clone(&self.queue);
            let orchestrator = Arc::clone(&self.orchestrator);
            let shutdown = shutdown.clone();
            let poll_interval = self.poll_interval;
            handles.push(tokio::spawn(async move {
                run_worker(worker_id, queue, orchestrator, poll_interval, shutdown).await
            }));
        }

        let queue = Arc::clone(&self.queue);
        let poll_interval = self.poll_interval;
        let max_attempts = self.max_attempts;
        handles.push(tokio::spawn(async move {
            run_maintenance(queue, poll_interval, max_attempts, shutdown).await
        }));

        handles
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<JobQueue>,
    orchestrator: Arc<IngestionOrchestrator>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Ingestion worker {} started", worker_id);
    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.dequeue_next().await {
            // A claimed job always runs to its transition, shutdown or not
            Ok(Some(job)) => {
                orchestrator.run_job(&job).await;
                continue;
            }
            Ok(None) => {}
            Err(e) => error!("Worker {}: failed to claim a job: {:?}", worker_id, e),
        }

        tokio::select! {
            _ = time::sleep(poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }
    info!("Ingestion worker {} stopped", worker_id);
}

/// Releases due delayed jobs and reclaims jobs whose worker died
async fn run_maintenance(
    queue: Arc<JobQueue>,
    poll_interval: Duration,
    max_attempts: i32,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        if let Err(e) = queue.poll_due().await {
            error!("Error releasing delayed jobs: {:?}", e);
        }
        match queue.reclaim_stale(max_attempts).await {
            Ok(0) => {}
            Ok(n) => info!("Reclaimed {} jobs with expired leases", n),
            Err(e) => error!("Error reclaiming stale jobs: {:?}", e),
        }
    }
    info!("Ingestion maintenance loop stopped");
}
