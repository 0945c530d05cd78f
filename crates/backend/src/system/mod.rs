pub mod ingestion;
pub mod middleware;
pub mod scheduler;
pub mod tracing;
