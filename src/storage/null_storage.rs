//! No-op storage backend for unit tests that exercise in-memory
//! components without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error_handling::types::StorageError;
use crate::matchmaking::types::{
    ChallengeStatus, DuelChallenge, DuelMatch, DuelStats, MatchContainers, MatchStatus,
    Preference, QueueEntry,
};
use crate::session_management::session::TerminalSession;
use crate::storage::storage_trait::Storage;

pub struct NullStorage;

#[async_trait]
impl Storage for NullStorage {
    async fn save_session(&self, _session: &TerminalSession) -> Result<(), StorageError> {
        Ok(())
    }

    async fn mark_session_activity(
        &self,
        _session_id: i64,
        _at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close_session(&self, _session_id: i64, _at: DateTime<Utc>) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get_session(&self, _session_id: i64) -> Result<Option<TerminalSession>, StorageError> {
        Ok(None)
    }

    async fn insert_match(
        &self,
        player1_id: i64,
        player2_id: i64,
        initial_log: &str,
    ) -> Result<DuelMatch, StorageError> {
        Ok(DuelMatch {
            id: 0,
            player1_id,
            player2_id,
            status: MatchStatus::Preparing,
            started_at: Utc::now(),
            ended_at: None,
            winner_id: None,
            container_data: None,
            score_change: None,
            logs: initial_log.to_string(),
        })
    }

    async fn get_match(&self, _match_id: i64) -> Result<Option<DuelMatch>, StorageError> {
        Ok(None)
    }

    async fn matches_for_user(&self, _user_id: i64) -> Result<Vec<DuelMatch>, StorageError> {
        Ok(Vec::new())
    }

    async fn active_match_for(&self, _user_id: i64) -> Result<Option<DuelMatch>, StorageError> {
        Ok(None)
    }

    async fn set_container_data(
        &self,
        _match_id: i64,
        _data: &MatchContainers,
    ) -> Result<(), StorageError> {
        Ok(())
    }

    async fn update_match_status(
        &self,
        _match_id: i64,
        _from: &[MatchStatus],
        _to: MatchStatus,
        _ended: bool,
        _log_line: Option<&str>,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn set_match_winner(
        &self,
        _match_id: i64,
        _winner_id: i64,
        _loser_id: i64,
        _score_change: i64,
        _to: MatchStatus,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn append_match_log(&self, _match_id: i64, _line: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get_stats(&self, _user_id: i64) -> Result<Option<DuelStats>, StorageError> {
        Ok(None)
    }

    async fn insert_queue_entry(&self, _entry: &QueueEntry) -> Result<(), StorageError> {
        Ok(())
    }

    async fn delete_queue_entry(&self, _user_id: i64) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_challenge(
        &self,
        challenger_id: i64,
        challenged_id: i64,
        difficulty: &Preference,
        expires_at: DateTime<Utc>,
    ) -> Result<DuelChallenge, StorageError> {
        Ok(DuelChallenge {
            id: 0,
            challenger_id,
            challenged_id,
            status: ChallengeStatus::Pending,
            difficulty: difficulty.clone(),
            created_at: Utc::now(),
            expires_at,
        })
    }

    async fn get_challenge(
        &self,
        _challenge_id: i64,
    ) -> Result<Option<DuelChallenge>, StorageError> {
        Ok(None)
    }

    async fn pending_challenge_between(
        &self,
        _challenger_id: i64,
        _challenged_id: i64,
    ) -> Result<Option<DuelChallenge>, StorageError> {
        Ok(None)
    }

    async fn update_challenge_status(
        &self,
        _challenge_id: i64,
        _from: ChallengeStatus,
        _to: ChallengeStatus,
    ) -> Result<bool, StorageError> {
        Ok(false)
    }

    async fn challenges_for_user(
        &self,
        _user_id: i64,
    ) -> Result<Vec<DuelChallenge>, StorageError> {
        Ok(Vec::new())
    }

    async fn expire_stale_challenges(&self, _now: DateTime<Utc>) -> Result<usize, StorageError> {
        Ok(0)
    }
}
