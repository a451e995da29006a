//! Matchmaking queue and duel state machine.
//!
//! The queue is a single-mutex critical section: enqueue, dequeue and
//! pairing all run under the same lock, so no user can be selected into
//! two simultaneous pairings. Duel matches move through
//! `preparing -> in_progress -> {player1_victory, player2_victory, draw}`
//! with `cancelled` reachable from both live states; terminal states are
//! immutable except for log appends.

pub mod duel;
pub mod queue;
pub mod types;

pub use duel::DuelService;
pub use queue::MatchQueue;
pub use types::{
    ChallengeStatus, DuelChallenge, DuelMatch, DuelStats, JoinOutcome, MatchContainers,
    MatchStatus, Preference, QueueEntry, QueuePreferences, QueueStatus,
};
