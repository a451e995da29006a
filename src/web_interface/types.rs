use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::container_management::container_manager::ContainerManager;
use crate::matchmaking::duel::DuelService;
use crate::matchmaking::types::{DuelChallenge, DuelMatch, MatchStatus, Preference, QueueEntry};
use crate::session_management::session_registry::SessionRegistry;

/// Shared handles cloned into every route filter.
#[derive(Clone)]
pub struct WebState {
    pub sessions: Arc<SessionRegistry>,
    pub containers: Arc<ContainerManager>,
    pub duels: Arc<DuelService>,
    pub default_image: String,
}

/// Caller identity as asserted by the upstream identity proxy.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: i64,
    pub is_admin: bool,
}

/// API error payload
#[derive(Serialize)]
pub struct ApiError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LaunchRequest {
    pub image: Option<String>,
}

#[derive(Serialize)]
pub struct LaunchResponse {
    pub session_id: i64,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub simulated_mode: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueJoinRequest {
    #[serde(default)]
    pub preferred_difficulty: Option<Preference>,
    #[serde(default)]
    pub preferred_challenge_type: Option<Preference>,
}

#[derive(Serialize)]
pub struct QueueJoinResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duel_match: Option<DuelMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_entry: Option<QueueEntry>,
}

#[derive(Serialize)]
pub struct QueueStatusResponse {
    pub in_queue: bool,
    pub active_match: Option<DuelMatch>,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub challenged_id: i64,
    #[serde(default)]
    pub difficulty: Option<Preference>,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRespondRequest {
    pub accept: bool,
}

#[derive(Serialize)]
pub struct ChallengeRespondResponse {
    pub challenge: DuelChallenge,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duel_match: Option<DuelMatch>,
}

#[derive(Debug, Deserialize)]
pub struct MatchStatusRequest {
    pub status: MatchStatus,
    #[serde(default)]
    pub winner_id: Option<i64>,
    #[serde(default)]
    pub score_change: Option<i64>,
}
