use crate::domain::common::AggregateId;
use crate::enums::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ID Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngestionJobId(pub Uuid);

impl IngestionJobId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn value(&self) -> Uuid {
        self.0
    }
}

impl AggregateId for IngestionJobId {
    fn as_string(&self) -> String {
        self.0.to_string()
    }

    fn from_string(s: &str) -> Result<Self, String> {
        Uuid::parse_str(s)
            .map(IngestionJobId)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Job lifecycle: pending → running → {succeeded, failed}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform-specific job input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    /// Fetch one page from a pull API; `None` means the first page
    Pull { cursor: Option<String> },
    /// Parse a stored CSV upload
    Upload { upload_id: String },
}

impl JobPayload {
    pub fn first_page() -> Self {
        JobPayload::Pull { cursor: None }
    }

    pub fn with_cursor(&self, next_cursor: String) -> Self {
        match self {
            JobPayload::Pull { .. } => JobPayload::Pull {
                cursor: Some(next_cursor),
            },
            other => other.clone(),
        }
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

/// One unit of ingestion work: one tenant, one platform, one trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: IngestionJobId,
    pub seq: i64,
    pub tenant_id: String,
    pub platform: Platform,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub attempt: i32,
    pub parent_job_id: Option<IngestionJobId>,
    pub records_written: i64,
    pub last_error: Option<String>,
    pub available_at: DateTime<Utc>,
    pub delayed: bool,
    pub created_at: DateTime<Utc>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Counts of jobs per status for one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusSummary {
    pub pending: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
}
