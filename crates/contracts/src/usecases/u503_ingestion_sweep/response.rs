use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepResponse {
    /// Jobs queued by this sweep
    pub enqueued: usize,
    /// Connections skipped (open job already queued, or not usable)
    pub skipped: usize,
}
