use serde::{Deserialize, Serialize};

/// 202 answer of POST /api/tenants/:tenant_id/uploads/:platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAccepted {
    pub job_id: String,
    pub upload_id: String,
    pub size: i64,
}
