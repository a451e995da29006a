use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel container binding for a session whose container is still
/// being provisioned (or never materialized — the simulated case).
pub const PENDING_CONTAINER: &str = "pending";

/// Authorization record binding a (user, match-or-lab) pair to one
/// container. `match_id` 0 marks standalone lab usage.
///
/// The token is minted from 32 random bytes and is never derivable from
/// the session id; validation requires presenting both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSession {
    pub id: i64,
    pub user_id: i64,
    pub match_id: i64,
    pub token: String,
    pub container_id: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl TerminalSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether a real container has been bound to this session.
    pub fn has_container(&self) -> bool {
        !self.container_id.is_empty() && self.container_id != PENDING_CONTAINER
    }
}
