//! Core types for queue entries, duel matches and direct challenges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A matchmaking preference. `"any"` is the wildcard that matches
/// everything, including other wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preference(String);

impl Preference {
    pub fn any() -> Self {
        Preference("any".to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            Preference::any()
        } else {
            Preference(value)
        }
    }

    pub fn is_any(&self) -> bool {
        self.0 == "any"
    }

    /// Two preferences are compatible when either side is the wildcard
    /// or both name the same bucket.
    pub fn matches(&self, other: &Preference) -> bool {
        self.is_any() || other.is_any() || self.0 == other.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Preference {
    fn default() -> Self {
        Preference::any()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Waiting,
    Matching,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Matching => "matching",
        }
    }
}

/// A user's standing request to be paired into a duel. At most one
/// entry per user exists at any time.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,
    pub status: QueueStatus,
    pub preferred_difficulty: Preference,
    pub preferred_challenge_type: Preference,
    pub expires_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Pairing compatibility: both preference axes must match.
    pub fn compatible_with(&self, other: &QueueEntry) -> bool {
        self.preferred_difficulty
            .matches(&other.preferred_difficulty)
            && self
                .preferred_challenge_type
                .matches(&other.preferred_challenge_type)
    }
}

/// Preferences supplied when joining the queue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueuePreferences {
    #[serde(default)]
    pub difficulty: Preference,
    #[serde(default)]
    pub challenge_type: Preference,
}

/// Duel match lifecycle states.
///
/// ```text
/// preparing ---(containers provisioned)--> in_progress
/// preparing ---(user/admin cancel)-------> cancelled
/// in_progress -(user/admin cancel)-------> cancelled
/// in_progress -(winner determined)-------> player1_victory | player2_victory
/// in_progress -(no winner, time/rule)----> draw
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Preparing,
    InProgress,
    Player1Victory,
    Player2Victory,
    Draw,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Preparing => "preparing",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::Player1Victory => "player1_victory",
            MatchStatus::Player2Victory => "player2_victory",
            MatchStatus::Draw => "draw",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "preparing" => Some(MatchStatus::Preparing),
            "in_progress" => Some(MatchStatus::InProgress),
            "player1_victory" => Some(MatchStatus::Player1Victory),
            "player2_victory" => Some(MatchStatus::Player2Victory),
            "draw" => Some(MatchStatus::Draw),
            "cancelled" => Some(MatchStatus::Cancelled),
            _ => None,
        }
    }

    /// States in which the match still owns live resources.
    pub fn is_active(&self) -> bool {
        matches!(self, MatchStatus::Preparing | MatchStatus::InProgress)
    }

    /// Terminal states are immutable except for log appends.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Per-player container bindings attached to a match once provisioning
/// completes. Fields stay `None` for players running in simulated mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchContainers {
    pub player1_container: Option<String>,
    pub player1_address: Option<String>,
    pub player2_container: Option<String>,
    pub player2_address: Option<String>,
}

impl MatchContainers {
    pub fn container_ids(&self) -> Vec<&str> {
        self.player1_container
            .iter()
            .chain(self.player2_container.iter())
            .map(String::as_str)
            .collect()
    }
}

/// A paired competitive session between two players.
#[derive(Debug, Clone, Serialize)]
pub struct DuelMatch {
    pub id: i64,
    pub player1_id: i64,
    pub player2_id: i64,
    pub status: MatchStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner_id: Option<i64>,
    pub container_data: Option<MatchContainers>,
    pub score_change: Option<i64>,
    pub logs: String,
}

impl DuelMatch {
    pub fn is_participant(&self, user_id: i64) -> bool {
        self.player1_id == user_id || self.player2_id == user_id
    }

    pub fn opponent_of(&self, user_id: i64) -> Option<i64> {
        if self.player1_id == user_id {
            Some(self.player2_id)
        } else if self.player2_id == user_id {
            Some(self.player1_id)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Pending => "pending",
            ChallengeStatus::Accepted => "accepted",
            ChallengeStatus::Rejected => "rejected",
            ChallengeStatus::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(ChallengeStatus::Pending),
            "accepted" => Some(ChallengeStatus::Accepted),
            "rejected" => Some(ChallengeStatus::Rejected),
            "expired" => Some(ChallengeStatus::Expired),
            _ => None,
        }
    }
}

/// A direct peer-to-peer duel invitation.
#[derive(Debug, Clone, Serialize)]
pub struct DuelChallenge {
    pub id: i64,
    pub challenger_id: i64,
    pub challenged_id: i64,
    pub status: ChallengeStatus,
    pub difficulty: Preference,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Per-user duel rating record. Ratings start at 1000 and never drop
/// below zero.
#[derive(Debug, Clone, Serialize)]
pub struct DuelStats {
    pub user_id: i64,
    pub wins: i64,
    pub losses: i64,
    pub rating: i64,
    pub last_played: Option<DateTime<Utc>>,
}

/// Result of a queue join: either paired immediately or left waiting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Matched(DuelMatch),
    Queued(QueueEntry),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preference_wildcard_matches_everything() {
        let any = Preference::any();
        let web = Preference::new("web");
        let pwn = Preference::new("pwn");

        assert!(any.matches(&web));
        assert!(web.matches(&any));
        assert!(any.matches(&any));
        assert!(web.matches(&web));
        assert!(!web.matches(&pwn));
    }

    #[test]
    fn empty_preference_becomes_wildcard() {
        assert!(Preference::new("").is_any());
    }

    #[test]
    fn match_status_round_trips_and_classifies() {
        for status in [
            MatchStatus::Preparing,
            MatchStatus::InProgress,
            MatchStatus::Player1Victory,
            MatchStatus::Player2Victory,
            MatchStatus::Draw,
            MatchStatus::Cancelled,
        ] {
            assert_eq!(MatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MatchStatus::parse("bogus"), None);

        assert!(MatchStatus::Preparing.is_active());
        assert!(MatchStatus::InProgress.is_active());
        assert!(MatchStatus::Draw.is_terminal());
        assert!(MatchStatus::Cancelled.is_terminal());
    }

    #[test]
    fn compatibility_requires_both_axes() {
        let make = |diff: &str, kind: &str| QueueEntry {
            user_id: 1,
            joined_at: Utc::now(),
            status: QueueStatus::Waiting,
            preferred_difficulty: Preference::new(diff),
            preferred_challenge_type: Preference::new(kind),
            expires_at: Utc::now(),
        };

        assert!(make("any", "web").compatible_with(&make("hard", "web")));
        assert!(!make("easy", "web").compatible_with(&make("hard", "web")));
        assert!(!make("any", "web").compatible_with(&make("any", "pwn")));
        assert!(make("any", "any").compatible_with(&make("hard", "pwn")));
    }
}
