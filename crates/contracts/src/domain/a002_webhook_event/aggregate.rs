use crate::enums::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Статус обработки входящего webhook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Received,
    Processed,
    Rejected,
    /// Fresh delivery id, but the sale it carries is already in the ledger
    Duplicate,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processed => "processed",
            Self::Rejected => "rejected",
            Self::Duplicate => "duplicate",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "received" => Some(Self::Received),
            "processed" => Some(Self::Processed),
            "rejected" => Some(Self::Rejected),
            "duplicate" => Some(Self::Duplicate),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Received)
    }
}

/// Audit/dedup record of one webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub platform: Platform,
    pub delivery_id: String,
    pub tenant_id: Option<String>,
    pub event_type: String,
    pub status: DeliveryStatus,
    pub note: Option<String>,
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
