pub mod backoff;
pub mod orchestrator;
pub mod queue;
pub mod repository;
pub mod worker;

pub use backoff::RetryPolicy;
pub use orchestrator::{IngestionOrchestrator, JobOutcome};
pub use queue::JobQueue;
pub use worker::IngestionWorkerPool;
