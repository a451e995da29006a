//! Storage Trait
//!
//! This module defines the `Storage` trait, the single seam between the
//! sandbox core and whatever durable store backs it.
//!
//! Implementors are responsible for:
//! - Persisting terminal session records (audit write-through; the
//!   in-memory registry stays authoritative for liveness)
//! - Owning duel match rows and their guarded status transitions
//! - Keeping rating records in step with match resolutions
//! - Mirroring queue entries and storing direct challenges
//!
//! All methods return a `Result` to handle potential storage errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error_handling::types::StorageError;
use crate::matchmaking::types::{
    ChallengeStatus, DuelChallenge, DuelMatch, DuelStats, MatchContainers, MatchStatus,
    Preference, QueueEntry,
};
use crate::session_management::session::TerminalSession;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Inserts or updates a terminal session record.
    async fn save_session(&self, session: &TerminalSession) -> Result<(), StorageError>;

    /// Stamps `last_activity_at` on a session row.
    async fn mark_session_activity(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Marks a session row inactive.
    async fn close_session(&self, session_id: i64, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Reads back one session row.
    async fn get_session(&self, session_id: i64) -> Result<Option<TerminalSession>, StorageError>;

    /// Creates a match in `preparing` with an initial log line and
    /// returns it with its store-assigned id.
    async fn insert_match(
        &self,
        player1_id: i64,
        player2_id: i64,
        initial_log: &str,
    ) -> Result<DuelMatch, StorageError>;

    async fn get_match(&self, match_id: i64) -> Result<Option<DuelMatch>, StorageError>;

    async fn matches_for_user(&self, user_id: i64) -> Result<Vec<DuelMatch>, StorageError>;

    /// The user's match still in an active state, if any.
    async fn active_match_for(&self, user_id: i64) -> Result<Option<DuelMatch>, StorageError>;

    /// Attaches per-player container bindings to a match.
    async fn set_container_data(
        &self,
        match_id: i64,
        data: &MatchContainers,
    ) -> Result<(), StorageError>;

    /// Conditionally transitions a match: the update applies only when
    /// the current status is one of `from`. Returns whether a row
    /// changed. `ended` stamps `ended_at`; `log_line` is appended to
    /// the audit trail in the same statement.
    async fn update_match_status(
        &self,
        match_id: i64,
        from: &[MatchStatus],
        to: MatchStatus,
        ended: bool,
        log_line: Option<&str>,
    ) -> Result<bool, StorageError>;

    /// Resolves a match with a winner, guarded on `in_progress`, and
    /// applies the rating delta to both players atomically with the
    /// status flip (winner gains, loser loses the same amount floored
    /// at zero). Returns whether the match row changed.
    async fn set_match_winner(
        &self,
        match_id: i64,
        winner_id: i64,
        loser_id: i64,
        score_change: i64,
        to: MatchStatus,
    ) -> Result<bool, StorageError>;

    /// Appends a line to a match's audit log. Allowed in any state,
    /// including terminal ones.
    async fn append_match_log(&self, match_id: i64, line: &str) -> Result<(), StorageError>;

    async fn get_stats(&self, user_id: i64) -> Result<Option<DuelStats>, StorageError>;

    /// Mirrors a queue entry into the store.
    async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<(), StorageError>;

    /// Drops a user's mirrored queue entry, if present.
    async fn delete_queue_entry(&self, user_id: i64) -> Result<(), StorageError>;

    async fn insert_challenge(
        &self,
        challenger_id: i64,
        challenged_id: i64,
        difficulty: &Preference,
        expires_at: DateTime<Utc>,
    ) -> Result<DuelChallenge, StorageError>;

    async fn get_challenge(
        &self,
        challenge_id: i64,
    ) -> Result<Option<DuelChallenge>, StorageError>;

    /// The live pending challenge from `challenger_id` to
    /// `challenged_id`, if one exists.
    async fn pending_challenge_between(
        &self,
        challenger_id: i64,
        challenged_id: i64,
    ) -> Result<Option<DuelChallenge>, StorageError>;

    /// Conditional challenge transition; returns whether a row changed.
    async fn update_challenge_status(
        &self,
        challenge_id: i64,
        from: ChallengeStatus,
        to: ChallengeStatus,
    ) -> Result<bool, StorageError>;

    async fn challenges_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<DuelChallenge>, StorageError>;

    /// Marks pending challenges past their expiry as expired; returns
    /// how many were flipped.
    async fn expire_stale_challenges(&self, now: DateTime<Utc>) -> Result<usize, StorageError>;
}
