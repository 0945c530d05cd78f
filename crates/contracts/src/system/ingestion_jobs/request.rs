use crate::system::ingestion_jobs::aggregate::JobStatus;
use serde::{Deserialize, Serialize};

/// GET /api/tenants/:tenant_id/jobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobListQuery {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub limit: Option<u64>,
}
