use std::env;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::error_handling::types::StorageError;
use crate::matchmaking::types::{
    ChallengeStatus, DuelChallenge, DuelMatch, DuelStats, MatchContainers, MatchStatus,
    Preference, QueueEntry, QueueStatus,
};
use crate::session_management::session::TerminalSession;
use crate::storage::storage_trait::Storage;

fn write_err(e: sqlx::Error) -> StorageError {
    StorageError::WriteFailed(e.to_string())
}

fn read_err(e: sqlx::Error) -> StorageError {
    StorageError::ReadFailed(e.to_string())
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StorageError::ReadFailed(format!("bad timestamp {:?}: {}", raw, e)))
}

fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StorageError> {
    raw.map(|s| parse_ts(&s)).transpose()
}

// Internal row mappings to avoid manual try_get
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: i64,
    user_id: i64,
    match_id: i64,
    token: String,
    container_id: String,
    is_active: i64,
    created_at: String,
    expires_at: String,
    last_activity_at: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> Result<TerminalSession, StorageError> {
        Ok(TerminalSession {
            id: self.id,
            user_id: self.user_id,
            match_id: self.match_id,
            token: self.token,
            container_id: self.container_id,
            is_active: self.is_active != 0,
            created_at: parse_ts(&self.created_at)?,
            expires_at: parse_ts(&self.expires_at)?,
            last_activity_at: parse_ts_opt(self.last_activity_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MatchRow {
    id: i64,
    player1_id: i64,
    player2_id: i64,
    status: String,
    started_at: String,
    ended_at: Option<String>,
    winner_id: Option<i64>,
    container_data: Option<String>,
    score_change: Option<i64>,
    logs: String,
}

impl MatchRow {
    fn into_match(self) -> Result<DuelMatch, StorageError> {
        let status = MatchStatus::parse(&self.status)
            .ok_or_else(|| StorageError::ReadFailed(format!("bad match status {:?}", self.status)))?;
        let container_data = match self.container_data {
            Some(json) => Some(
                serde_json::from_str::<MatchContainers>(&json)
                    .map_err(|e| StorageError::ReadFailed(e.to_string()))?,
            ),
            None => None,
        };
        Ok(DuelMatch {
            id: self.id,
            player1_id: self.player1_id,
            player2_id: self.player2_id,
            status,
            started_at: parse_ts(&self.started_at)?,
            ended_at: parse_ts_opt(self.ended_at)?,
            winner_id: self.winner_id,
            container_data,
            score_change: self.score_change,
            logs: self.logs,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChallengeRow {
    id: i64,
    challenger_id: i64,
    challenged_id: i64,
    status: String,
    difficulty: String,
    created_at: String,
    expires_at: String,
}

impl ChallengeRow {
    fn into_challenge(self) -> Result<DuelChallenge, StorageError> {
        let status = ChallengeStatus::parse(&self.status).ok_or_else(|| {
            StorageError::ReadFailed(format!("bad challenge status {:?}", self.status))
        })?;
        Ok(DuelChallenge {
            id: self.id,
            challenger_id: self.challenger_id,
            challenged_id: self.challenged_id,
            status,
            difficulty: Preference::new(self.difficulty),
            created_at: parse_ts(&self.created_at)?,
            expires_at: parse_ts(&self.expires_at)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    user_id: i64,
    wins: i64,
    losses: i64,
    rating: i64,
    last_played: Option<String>,
}

const MATCH_COLUMNS: &str = "id, player1_id, player2_id, status, started_at, ended_at, \
     winner_id, container_data, score_change, logs";

const CHALLENGE_COLUMNS: &str =
    "id, challenger_id, challenged_id, status, difficulty, created_at, expires_at";

/// SQLite-backed [`Storage`] implementation. The schema is created on
/// open, so a fresh database file is immediately usable.
pub struct DatabaseStorage {
    pool: Pool<Sqlite>,
}

impl DatabaseStorage {
    /// Default database filename used in the application's working directory
    const DEFAULT_DB_FILE: &'static str = "arena.sqlite3";

    /// Create or open the database in the current working directory with the default filename
    pub async fn new() -> Result<Self, StorageError> {
        let cwd = env::current_dir().map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        Self::new_file(cwd.join(Self::DEFAULT_DB_FILE)).await
    }

    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
            }
        }

        let opts = SqliteConnectOptions::new()
            .filename(path_ref)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await
            .map_err(write_err)?;

        for ddl in [
            "CREATE TABLE IF NOT EXISTS terminal_sessions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                match_id INTEGER NOT NULL,
                token TEXT NOT NULL,
                container_id TEXT NOT NULL,
                is_active INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                last_activity_at TEXT
            );",
            "CREATE TABLE IF NOT EXISTS duel_matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player1_id INTEGER NOT NULL,
                player2_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                winner_id INTEGER,
                container_data TEXT,
                score_change INTEGER,
                logs TEXT NOT NULL DEFAULT ''
            );",
            "CREATE TABLE IF NOT EXISTS duel_stats (
                user_id INTEGER PRIMARY KEY,
                wins INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                rating INTEGER NOT NULL DEFAULT 1000,
                last_played TEXT
            );",
            "CREATE TABLE IF NOT EXISTS duel_queue (
                user_id INTEGER PRIMARY KEY,
                joined_at TEXT NOT NULL,
                status TEXT NOT NULL,
                preferred_difficulty TEXT NOT NULL,
                preferred_challenge_type TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS duel_challenges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                challenger_id INTEGER NOT NULL,
                challenged_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                difficulty TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );",
        ] {
            sqlx::query(ddl).execute(&pool).await.map_err(write_err)?;
        }

        Ok(Self { pool })
    }

    async fn apply_match_result(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        user_id: i64,
        won: bool,
        score_change: i64,
        now: &str,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO duel_stats (user_id) VALUES (?1) ON CONFLICT(user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(write_err)?;

        let sql = if won {
            "UPDATE duel_stats SET wins = wins + 1, rating = rating + ?1, last_played = ?2
             WHERE user_id = ?3"
        } else {
            "UPDATE duel_stats SET losses = losses + 1, rating = MAX(0, rating - ?1), last_played = ?2
             WHERE user_id = ?3"
        };
        sqlx::query(sql)
            .bind(score_change)
            .bind(now)
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

#[async_trait]
impl Storage for DatabaseStorage {
    async fn save_session(&self, session: &TerminalSession) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO terminal_sessions
                (id, user_id, match_id, token, container_id, is_active, created_at, expires_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               container_id = excluded.container_id,
               is_active = excluded.is_active,
               last_activity_at = excluded.last_activity_at",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.match_id)
        .bind(&session.token)
        .bind(&session.container_id)
        .bind(session.is_active as i64)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .bind(session.last_activity_at.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn mark_session_activity(
        &self,
        session_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE terminal_sessions SET last_activity_at = ?1 WHERE id = ?2")
            .bind(at.to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn close_session(&self, session_id: i64, at: DateTime<Utc>) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE terminal_sessions SET is_active = 0, last_activity_at = ?1 WHERE id = ?2",
        )
        .bind(at.to_rfc3339())
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<TerminalSession>, StorageError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, user_id, match_id, token, container_id, is_active, created_at, expires_at, last_activity_at
             FROM terminal_sessions WHERE id = ?1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        row.map(SessionRow::into_session).transpose()
    }

    async fn insert_match(
        &self,
        player1_id: i64,
        player2_id: i64,
        initial_log: &str,
    ) -> Result<DuelMatch, StorageError> {
        let result = sqlx::query(
            "INSERT INTO duel_matches (player1_id, player2_id, status, started_at, logs)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(player1_id)
        .bind(player2_id)
        .bind(MatchStatus::Preparing.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(initial_log)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = result.last_insert_rowid();
        self.get_match(id)
            .await?
            .ok_or_else(|| StorageError::ReadFailed(format!("match {} vanished after insert", id)))
    }

    async fn get_match(&self, match_id: i64) -> Result<Option<DuelMatch>, StorageError> {
        let row: Option<MatchRow> = sqlx::query_as(&format!(
            "SELECT {} FROM duel_matches WHERE id = ?1",
            MATCH_COLUMNS
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        row.map(MatchRow::into_match).transpose()
    }

    async fn matches_for_user(&self, user_id: i64) -> Result<Vec<DuelMatch>, StorageError> {
        let rows: Vec<MatchRow> = sqlx::query_as(&format!(
            "SELECT {} FROM duel_matches
             WHERE player1_id = ?1 OR player2_id = ?1
             ORDER BY started_at DESC",
            MATCH_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;
        rows.into_iter().map(MatchRow::into_match).collect()
    }

    async fn active_match_for(&self, user_id: i64) -> Result<Option<DuelMatch>, StorageError> {
        let row: Option<MatchRow> = sqlx::query_as(&format!(
            "SELECT {} FROM duel_matches
             WHERE (player1_id = ?1 OR player2_id = ?1)
               AND status IN ('preparing', 'in_progress')
             LIMIT 1",
            MATCH_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        row.map(MatchRow::into_match).transpose()
    }

    async fn set_container_data(
        &self,
        match_id: i64,
        data: &MatchContainers,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string(data).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        sqlx::query("UPDATE duel_matches SET container_data = ?1 WHERE id = ?2")
            .bind(json)
            .bind(match_id)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn update_match_status(
        &self,
        match_id: i64,
        from: &[MatchStatus],
        to: MatchStatus,
        ended: bool,
        log_line: Option<&str>,
    ) -> Result<bool, StorageError> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE duel_matches
             SET status = ?, ended_at = COALESCE(?, ended_at), logs = logs || ?
             WHERE id = ? AND status IN ({})",
            placeholders
        );

        let ended_at = if ended {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };
        let log_chunk = log_line.map(|l| format!("\n{}", l)).unwrap_or_default();

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(ended_at)
            .bind(log_chunk)
            .bind(match_id);
        for status in from {
            query = query.bind(status.as_str());
        }

        let result = query.execute(&self.pool).await.map_err(write_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_match_winner(
        &self,
        match_id: i64,
        winner_id: i64,
        loser_id: i64,
        score_change: i64,
        to: MatchStatus,
    ) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "UPDATE duel_matches
             SET status = ?1, ended_at = ?2, winner_id = ?3, score_change = ?4
             WHERE id = ?5 AND status = 'in_progress'",
        )
        .bind(to.as_str())
        .bind(&now)
        .bind(winner_id)
        .bind(score_change)
        .bind(match_id)
        .execute(&mut *tx)
        .await
        .map_err(write_err)?;

        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(write_err)?;
            return Ok(false);
        }

        Self::apply_match_result(&mut tx, winner_id, true, score_change, &now).await?;
        Self::apply_match_result(&mut tx, loser_id, false, score_change, &now).await?;

        tx.commit().await.map_err(write_err)?;
        Ok(true)
    }

    async fn append_match_log(&self, match_id: i64, line: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE duel_matches SET logs = logs || ?1 WHERE id = ?2")
            .bind(format!("\n{}", line))
            .bind(match_id)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn get_stats(&self, user_id: i64) -> Result<Option<DuelStats>, StorageError> {
        let row: Option<StatsRow> = sqlx::query_as(
            "SELECT user_id, wins, losses, rating, last_played FROM duel_stats WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        row.map(|r| {
            Ok(DuelStats {
                user_id: r.user_id,
                wins: r.wins,
                losses: r.losses,
                rating: r.rating,
                last_played: parse_ts_opt(r.last_played)?,
            })
        })
        .transpose()
    }

    async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO duel_queue
                (user_id, joined_at, status, preferred_difficulty, preferred_challenge_type, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
               joined_at = excluded.joined_at,
               status = excluded.status,
               preferred_difficulty = excluded.preferred_difficulty,
               preferred_challenge_type = excluded.preferred_challenge_type,
               expires_at = excluded.expires_at",
        )
        .bind(entry.user_id)
        .bind(entry.joined_at.to_rfc3339())
        .bind(entry.status.as_str())
        .bind(entry.preferred_difficulty.as_str())
        .bind(entry.preferred_challenge_type.as_str())
        .bind(entry.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(())
    }

    async fn delete_queue_entry(&self, user_id: i64) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM duel_queue WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    async fn insert_challenge(
        &self,
        challenger_id: i64,
        challenged_id: i64,
        difficulty: &Preference,
        expires_at: DateTime<Utc>,
    ) -> Result<DuelChallenge, StorageError> {
        let result = sqlx::query(
            "INSERT INTO duel_challenges
                (challenger_id, challenged_id, status, difficulty, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(challenger_id)
        .bind(challenged_id)
        .bind(ChallengeStatus::Pending.as_str())
        .bind(difficulty.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        let id = result.last_insert_rowid();
        self.get_challenge(id).await?.ok_or_else(|| {
            StorageError::ReadFailed(format!("challenge {} vanished after insert", id))
        })
    }

    async fn get_challenge(
        &self,
        challenge_id: i64,
    ) -> Result<Option<DuelChallenge>, StorageError> {
        let row: Option<ChallengeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM duel_challenges WHERE id = ?1",
            CHALLENGE_COLUMNS
        ))
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        row.map(ChallengeRow::into_challenge).transpose()
    }

    async fn pending_challenge_between(
        &self,
        challenger_id: i64,
        challenged_id: i64,
    ) -> Result<Option<DuelChallenge>, StorageError> {
        let row: Option<ChallengeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM duel_challenges
             WHERE challenger_id = ?1 AND challenged_id = ?2
               AND status = 'pending' AND expires_at > ?3
             LIMIT 1",
            CHALLENGE_COLUMNS
        ))
        .bind(challenger_id)
        .bind(challenged_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;
        row.map(ChallengeRow::into_challenge).transpose()
    }

    async fn update_challenge_status(
        &self,
        challenge_id: i64,
        from: ChallengeStatus,
        to: ChallengeStatus,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE duel_challenges SET status = ?1 WHERE id = ?2 AND status = ?3",
        )
        .bind(to.as_str())
        .bind(challenge_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn challenges_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<DuelChallenge>, StorageError> {
        let rows: Vec<ChallengeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM duel_challenges
             WHERE challenger_id = ?1 OR challenged_id = ?1
             ORDER BY created_at DESC",
            CHALLENGE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(read_err)?;
        rows.into_iter().map(ChallengeRow::into_challenge).collect()
    }

    async fn expire_stale_challenges(&self, now: DateTime<Utc>) -> Result<usize, StorageError> {
        let result = sqlx::query(
            "UPDATE duel_challenges SET status = 'expired'
             WHERE status = 'pending' AND expires_at <= ?1",
        )
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(write_err)?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::types::QueuePreferences;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn temp_db() -> DatabaseStorage {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite3");
        // Keep TempDir alive by leaking it for the test duration
        Box::leak(Box::new(dir));
        DatabaseStorage::new_file(path).await.unwrap()
    }

    fn session(id: i64) -> TerminalSession {
        let now = Utc::now();
        TerminalSession {
            id,
            user_id: 1,
            match_id: 0,
            token: "deadbeef".repeat(8),
            container_id: "pending".to_string(),
            is_active: true,
            created_at: now,
            expires_at: now + Duration::hours(2),
            last_activity_at: Some(now),
        }
    }

    #[tokio::test]
    async fn session_rows_round_trip() {
        let storage = temp_db().await;
        let s = session(7);
        storage.save_session(&s).await.unwrap();

        let fetched = storage.get_session(7).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, 1);
        assert!(fetched.is_active);
        assert_eq!(fetched.token, s.token);

        storage.close_session(7, Utc::now()).await.unwrap();
        let fetched = storage.get_session(7).await.unwrap().unwrap();
        assert!(!fetched.is_active);

        assert!(storage.get_session(8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn match_lifecycle_and_guarded_transitions() {
        let storage = temp_db().await;
        let m = storage.insert_match(10, 20, "created").await.unwrap();
        assert_eq!(m.status, MatchStatus::Preparing);
        assert_eq!(m.logs, "created");

        let active = storage.active_match_for(10).await.unwrap().unwrap();
        assert_eq!(active.id, m.id);
        assert!(storage.active_match_for(30).await.unwrap().is_none());

        // preparing -> in_progress passes; repeating it fails the guard
        assert!(storage
            .update_match_status(
                m.id,
                &[MatchStatus::Preparing],
                MatchStatus::InProgress,
                false,
                Some("started"),
            )
            .await
            .unwrap());
        assert!(!storage
            .update_match_status(
                m.id,
                &[MatchStatus::Preparing],
                MatchStatus::InProgress,
                false,
                None,
            )
            .await
            .unwrap());

        let current = storage.get_match(m.id).await.unwrap().unwrap();
        assert_eq!(current.status, MatchStatus::InProgress);
        assert!(current.logs.contains("started"));
        assert!(current.ended_at.is_none());
    }

    #[tokio::test]
    async fn winner_updates_ratings_and_is_terminal() {
        let storage = temp_db().await;
        let m = storage.insert_match(10, 20, "created").await.unwrap();
        storage
            .update_match_status(
                m.id,
                &[MatchStatus::Preparing],
                MatchStatus::InProgress,
                false,
                None,
            )
            .await
            .unwrap();

        assert!(storage
            .set_match_winner(m.id, 10, 20, 25, MatchStatus::Player1Victory)
            .await
            .unwrap());

        let resolved = storage.get_match(m.id).await.unwrap().unwrap();
        assert_eq!(resolved.status, MatchStatus::Player1Victory);
        assert_eq!(resolved.winner_id, Some(10));
        assert_eq!(resolved.score_change, Some(25));
        assert!(resolved.ended_at.is_some());

        let winner = storage.get_stats(10).await.unwrap().unwrap();
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.losses, 0);
        assert_eq!(winner.rating, 1025);
        let loser = storage.get_stats(20).await.unwrap().unwrap();
        assert_eq!(loser.losses, 1);
        assert_eq!(loser.rating, 975);

        // terminal: a second resolution attempt changes nothing
        assert!(!storage
            .set_match_winner(m.id, 20, 10, 25, MatchStatus::Player2Victory)
            .await
            .unwrap());
        let still = storage.get_match(m.id).await.unwrap().unwrap();
        assert_eq!(still.winner_id, Some(10));
    }

    #[tokio::test]
    async fn loser_rating_floors_at_zero() {
        let storage = temp_db().await;
        // Drain user 20 with repeated large losses.
        for _ in 0..3 {
            let m = storage.insert_match(10, 20, "created").await.unwrap();
            storage
                .update_match_status(
                    m.id,
                    &[MatchStatus::Preparing],
                    MatchStatus::InProgress,
                    false,
                    None,
                )
                .await
                .unwrap();
            storage
                .set_match_winner(m.id, 10, 20, 600, MatchStatus::Player1Victory)
                .await
                .unwrap();
        }
        let loser = storage.get_stats(20).await.unwrap().unwrap();
        assert_eq!(loser.rating, 0);
        assert_eq!(loser.losses, 3);
        let winner = storage.get_stats(10).await.unwrap().unwrap();
        assert_eq!(winner.rating, 1000 + 3 * 600);
    }

    #[tokio::test]
    async fn container_data_and_log_appends() {
        let storage = temp_db().await;
        let m = storage.insert_match(1, 2, "created").await.unwrap();

        let data = MatchContainers {
            player1_container: Some("c-1".to_string()),
            player1_address: Some("172.17.0.2".to_string()),
            player2_container: None,
            player2_address: None,
        };
        storage.set_container_data(m.id, &data).await.unwrap();
        storage.append_match_log(m.id, "note").await.unwrap();

        let fetched = storage.get_match(m.id).await.unwrap().unwrap();
        let stored = fetched.container_data.unwrap();
        assert_eq!(stored.player1_container.as_deref(), Some("c-1"));
        assert!(stored.player2_container.is_none());
        assert!(fetched.logs.ends_with("\nnote"));
    }

    #[tokio::test]
    async fn queue_rows_mirror_insert_and_delete() {
        let storage = temp_db().await;
        let prefs = QueuePreferences::default();
        let now = Utc::now();
        let entry = QueueEntry {
            user_id: 5,
            joined_at: now,
            status: QueueStatus::Waiting,
            preferred_difficulty: prefs.difficulty,
            preferred_challenge_type: prefs.challenge_type,
            expires_at: now + Duration::minutes(5),
        };
        storage.insert_queue_entry(&entry).await.unwrap();
        // re-inserting the same user replaces rather than fails
        storage.insert_queue_entry(&entry).await.unwrap();
        storage.delete_queue_entry(5).await.unwrap();
        storage.delete_queue_entry(5).await.unwrap();
    }

    #[tokio::test]
    async fn challenge_lifecycle() {
        let storage = temp_db().await;
        let expires = Utc::now() + Duration::hours(24);
        let ch = storage
            .insert_challenge(1, 2, &Preference::new("medium"), expires)
            .await
            .unwrap();
        assert_eq!(ch.status, ChallengeStatus::Pending);
        assert_eq!(ch.difficulty.as_str(), "medium");

        let pending = storage.pending_challenge_between(1, 2).await.unwrap();
        assert_eq!(pending.unwrap().id, ch.id);
        // directional: the reverse pair has no pending challenge
        assert!(storage.pending_challenge_between(2, 1).await.unwrap().is_none());

        assert!(storage
            .update_challenge_status(ch.id, ChallengeStatus::Pending, ChallengeStatus::Accepted)
            .await
            .unwrap());
        assert!(!storage
            .update_challenge_status(ch.id, ChallengeStatus::Pending, ChallengeStatus::Rejected)
            .await
            .unwrap());

        let listed = storage.challenges_for_user(2).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ChallengeStatus::Accepted);
    }

    #[tokio::test]
    async fn stale_challenges_expire_in_bulk() {
        let storage = temp_db().await;
        let past = Utc::now() - Duration::hours(1);
        let future = Utc::now() + Duration::hours(1);
        storage
            .insert_challenge(1, 2, &Preference::any(), past)
            .await
            .unwrap();
        storage
            .insert_challenge(3, 4, &Preference::any(), future)
            .await
            .unwrap();

        let expired = storage.expire_stale_challenges(Utc::now()).await.unwrap();
        assert_eq!(expired, 1);

        let fresh = storage.pending_challenge_between(3, 4).await.unwrap();
        assert!(fresh.is_some());
    }
}
