pub mod aggregate;
pub mod request;

pub use aggregate::{IngestionJob, IngestionJobId, JobPayload, JobStatus, JobStatusSummary};
pub use request::JobListQuery;
