use serde::{Deserialize, Serialize};

/// Body of every 200 answer the webhook endpoint gives
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookAck {
    /// "acknowledged" | "success"
    pub status: String,
    pub message: String,
}

impl WebhookAck {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn acknowledged(message: impl Into<String>) -> Self {
        Self {
            status: "acknowledged".to_string(),
            message: message.into(),
        }
    }
}

/// Body of a 401 answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookRejection {
    pub error: String,
    pub reason: String,
}
