use crate::enums::platform::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Enums
// ============================================================================

/// Состояние подключения к платформе
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Pending,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "connected" => Some(Self::Connected),
            "pending" => Some(Self::Pending),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

// ============================================================================
// Aggregate Root
// ============================================================================

/// Per-tenant credentials for one platform.
///
/// `credential` is an opaque blob (API key, OAuth access token, refresh
/// token bundle); only the adapter of this platform interprets it.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlatformConnection {
    pub id: String,
    pub tenant_id: String,
    pub platform: Platform,
    pub status: ConnectionStatus,
    pub credential: String,
    pub last_error: Option<String>,
    /// Set when a pull chain last ran to its final page; pulls after that
    /// only ask the platform for recent history
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformConnection {
    pub fn is_usable(&self) -> bool {
        self.status == ConnectionStatus::Connected && !self.credential.trim().is_empty()
    }

    /// View safe to hand out over the API
    pub fn redacted(&self) -> PlatformConnectionView {
        PlatformConnectionView {
            id: self.id.clone(),
            tenant_id: self.tenant_id.clone(),
            platform: self.platform,
            status: self.status,
            has_credential: !self.credential.is_empty(),
            last_error: self.last_error.clone(),
            synced_at: self.synced_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl fmt::Debug for PlatformConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConnection")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("platform", &self.platform)
            .field("status", &self.status)
            .field("credential", &"****")
            .field("last_error", &self.last_error)
            .field("synced_at", &self.synced_at)
            .finish()
    }
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConnectionView {
    pub id: String,
    pub tenant_id: String,
    pub platform: Platform,
    pub status: ConnectionStatus,
    pub has_credential: bool,
    pub last_error: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PUT /api/tenants/:tenant_id/connections/:platform
#[derive(Clone, Serialize, Deserialize)]
pub struct UpsertConnectionRequest {
    pub credential: String,
}

impl fmt::Debug for UpsertConnectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpsertConnectionRequest")
            .field("credential", &"****")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_never_prints_credential() {
        let conn = PlatformConnection {
            id: "c1".into(),
            tenant_id: "t1".into(),
            platform: Platform::Gumroad,
            status: ConnectionStatus::Connected,
            credential: "super-secret-token".into(),
            last_error: None,
            synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let printed = format!("{:?}", conn);
        assert!(!printed.contains("super-secret-token"));
        assert!(conn.is_usable());

        let view = serde_json::to_string(&conn.redacted()).unwrap();
        assert!(!view.contains("super-secret-token"));
    }
}
