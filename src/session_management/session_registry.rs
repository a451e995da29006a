use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use rand::RngCore;
use tokio::sync::RwLock;

use crate::error_handling::types::SessionError;
use crate::session_management::session::{TerminalSession, PENDING_CONTAINER};
use crate::storage::storage_trait::Storage;

/// Issues and validates terminal session tokens.
///
/// The registry owns the in-memory session map; nothing else mutates
/// it. It deliberately holds no container runtime handle — binding a
/// session to a *running* container is enforced by the lifecycle
/// manager's session-aware entry points, which are the only callers of
/// [`create_session`](SessionRegistry::create_session).
///
/// Validation is uniform: an unknown id, an expired record, a closed
/// record and a mismatched token are all the same `SessionError::Invalid`
/// outcome, and the token comparison runs over the full token length
/// regardless of where it diverges.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<i64, TerminalSession>>,
    next_id: AtomicI64,
    ttl: Duration,
    storage: Arc<dyn Storage>,
}

/// Compares two tokens without short-circuiting on the first mismatch.
fn token_matches(expected: &str, presented: &str) -> bool {
    let a = expected.as_bytes();
    let b = presented.as_bytes();
    let len = a.len().max(b.len());
    let mut diff = a.len() ^ b.len();
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= (x ^ y) as usize;
    }
    diff == 0
}

fn mint_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

impl SessionRegistry {
    pub fn new(storage: Arc<dyn Storage>, ttl_secs: u64) -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            ttl: Duration::seconds(ttl_secs as i64),
            storage,
        }
    }

    /// Mints a new session for `(user_id, match_id)` with a pending
    /// container binding. The caller binds the real container id once
    /// provisioning succeeds.
    pub async fn create_session(&self, user_id: i64, match_id: i64) -> TerminalSession {
        let now = Utc::now();
        let session = TerminalSession {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user_id,
            match_id,
            token: mint_token(),
            container_id: PENDING_CONTAINER.to_string(),
            is_active: true,
            created_at: now,
            expires_at: now + self.ttl,
            last_activity_at: Some(now),
        };

        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        self.persist(&session).await;

        info!(
            "Created terminal session {} for user {} (match {})",
            session.id, user_id, match_id
        );
        session
    }

    /// Binds a provisioned container to an existing session.
    pub async fn bind_container(&self, session_id: i64, container_id: &str) {
        let mut updated = None;
        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(&session_id) {
                session.container_id = container_id.to_string();
                updated = Some(session.clone());
            }
        }
        match updated {
            Some(session) => {
                debug!("Bound container {} to session {}", container_id, session_id);
                self.persist(&session).await;
            }
            None => warn!(
                "Tried to bind container {} to unknown session {}",
                container_id, session_id
            ),
        }
    }

    /// Validates a presented (id, token) pair against a live record.
    pub async fn validate(
        &self,
        session_id: i64,
        token: &str,
    ) -> Result<TerminalSession, SessionError> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;

        // Run the token comparison even when the id is unknown so the
        // outcome does not reveal which part of the pair was wrong.
        let (record, stored_token) = match sessions.get(&session_id) {
            Some(s) => (Some(s), s.token.clone()),
            None => (None, mint_token()),
        };

        let token_ok = token_matches(&stored_token, token);
        match record {
            Some(s) if token_ok && s.is_active && !s.is_expired(now) => Ok(s.clone()),
            _ => Err(SessionError::Invalid),
        }
    }

    /// Records client activity. Returns `false` when the session is no
    /// longer live, which tells a running bridge to terminate.
    pub async fn touch(&self, session_id: i64) -> bool {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session_id) {
            Some(s) if s.is_active && !s.is_expired(now) => {
                s.last_activity_at = Some(now);
                if let Err(e) = self.storage.mark_session_activity(session_id, now).await {
                    debug!("Failed to persist activity for session {}: {}", session_id, e);
                }
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, session_id: i64) -> Option<TerminalSession> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Marks a session inactive. Container teardown is the caller's
    /// decision — duel sessions survive a disconnect, lab sessions are
    /// torn down on explicit close.
    pub async fn close(&self, session_id: i64) -> Option<TerminalSession> {
        let closed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(&session_id) {
                Some(s) if s.is_active => {
                    s.is_active = false;
                    Some(s.clone())
                }
                _ => None,
            }
        };
        if let Some(session) = &closed {
            info!("Closed terminal session {}", session.id);
            if let Err(e) = self.storage.close_session(session.id, Utc::now()).await {
                warn!("Failed to persist close for session {}: {}", session.id, e);
            }
        }
        closed
    }

    /// Finds the caller's live session for a match, enabling
    /// reconnect-to-existing semantics instead of spawning duplicates.
    pub async fn active_session_for(
        &self,
        user_id: i64,
        match_id: i64,
    ) -> Option<TerminalSession> {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .find(|s| {
                s.user_id == user_id && s.match_id == match_id && s.is_active && !s.is_expired(now)
            })
            .cloned()
    }

    /// Invalidates every session bound to a container. Called by the
    /// lifecycle manager as part of the stop cascade.
    pub async fn invalidate_for_container(&self, container_id: &str) -> usize {
        let mut closed = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                if session.container_id == container_id && session.is_active {
                    session.is_active = false;
                    closed.push(session.id);
                }
            }
        }
        for id in &closed {
            if let Err(e) = self.storage.close_session(*id, Utc::now()).await {
                warn!("Failed to persist close for session {}: {}", id, e);
            }
        }
        if !closed.is_empty() {
            info!(
                "Invalidated {} session(s) bound to container {}",
                closed.len(),
                container_id
            );
        }
        closed.len()
    }

    /// Closes every expired session and returns the closed records so
    /// the caller can decide on container teardown.
    pub async fn sweep_expired(&self) -> Vec<TerminalSession> {
        let now = Utc::now();
        let mut swept = Vec::new();
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                if session.is_active && session.is_expired(now) {
                    session.is_active = false;
                    swept.push(session.clone());
                }
            }
            // Inactive records have no further use in memory.
            sessions.retain(|_, s| s.is_active);
        }
        for session in &swept {
            if let Err(e) = self.storage.close_session(session.id, now).await {
                warn!("Failed to persist close for session {}: {}", session.id, e);
            }
        }
        if !swept.is_empty() {
            info!("Expiry sweep closed {} session(s)", swept.len());
        }
        swept
    }

    pub async fn active_count(&self) -> usize {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_active && !s.is_expired(now))
            .count()
    }

    async fn persist(&self, session: &TerminalSession) {
        if let Err(e) = self.storage.save_session(session).await {
            warn!("Failed to persist session {}: {}", session.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::null_storage::NullStorage;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(NullStorage), 3600)
    }

    fn registry_with_ttl(ttl_secs: u64) -> SessionRegistry {
        SessionRegistry::new(Arc::new(NullStorage), ttl_secs)
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let a = mint_token();
        let b = mint_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn token_comparison_handles_unequal_lengths() {
        assert!(token_matches("abc", "abc"));
        assert!(!token_matches("abc", "ab"));
        assert!(!token_matches("abc", "abd"));
        assert!(!token_matches("", "a"));
        assert!(token_matches("", ""));
    }

    #[tokio::test]
    async fn validate_accepts_only_exact_live_pair() {
        let registry = registry();
        let session = registry.create_session(1, 0).await;

        assert!(registry.validate(session.id, &session.token).await.is_ok());
        assert!(registry.validate(session.id, "wrong").await.is_err());
        assert!(registry.validate(session.id + 1, &session.token).await.is_err());
    }

    #[tokio::test]
    async fn validate_rejects_near_miss_tokens() {
        let registry = registry();
        let session = registry.create_session(1, 0).await;

        // Flip each hex digit of the real token in turn; every variant
        // must fail while the original keeps validating.
        for i in 0..session.token.len() {
            let mut fuzzed: Vec<u8> = session.token.clone().into_bytes();
            fuzzed[i] = if fuzzed[i] == b'0' { b'1' } else { b'0' };
            let fuzzed = String::from_utf8(fuzzed).unwrap();
            if fuzzed == session.token {
                continue;
            }
            assert!(
                registry.validate(session.id, &fuzzed).await.is_err(),
                "near-miss token accepted at position {}",
                i
            );
        }
        assert!(registry.validate(session.id, &session.token).await.is_ok());
    }

    #[tokio::test]
    async fn closed_sessions_never_validate_again() {
        let registry = registry();
        let session = registry.create_session(1, 0).await;

        assert!(registry.close(session.id).await.is_some());
        assert!(registry.validate(session.id, &session.token).await.is_err());
        // close is not repeatable either
        assert!(registry.close(session.id).await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_fail_validation_and_get_swept() {
        let registry = registry_with_ttl(0);
        let session = registry.create_session(1, 0).await;

        assert!(registry.validate(session.id, &session.token).await.is_err());
        assert!(!registry.touch(session.id).await);

        let swept = registry.sweep_expired().await;
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, session.id);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn invalidate_for_container_closes_all_bound_sessions() {
        let registry = registry();
        let s1 = registry.create_session(1, 0).await;
        let s2 = registry.create_session(2, 0).await;
        let s3 = registry.create_session(3, 0).await;

        registry.bind_container(s1.id, "c-1").await;
        registry.bind_container(s2.id, "c-1").await;
        registry.bind_container(s3.id, "c-2").await;

        assert_eq!(registry.invalidate_for_container("c-1").await, 2);
        assert!(registry.validate(s1.id, &s1.token).await.is_err());
        assert!(registry.validate(s2.id, &s2.token).await.is_err());
        assert!(registry.validate(s3.id, &s3.token).await.is_ok());
    }

    #[tokio::test]
    async fn active_session_lookup_ignores_closed_and_other_matches() {
        let registry = registry();
        let lab = registry.create_session(1, 0).await;
        let duel = registry.create_session(1, 42).await;

        let found = registry.active_session_for(1, 0).await.unwrap();
        assert_eq!(found.id, lab.id);
        let found = registry.active_session_for(1, 42).await.unwrap();
        assert_eq!(found.id, duel.id);
        assert!(registry.active_session_for(2, 0).await.is_none());

        registry.close(lab.id).await;
        assert!(registry.active_session_for(1, 0).await.is_none());
    }
}
