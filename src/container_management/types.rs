//! Core types used by the container management subsystem.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::container_runtime::types::OwnerLabels;
use crate::session_management::session::TerminalSession;

/// Aggregate counters describing the current and historical container state.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerStats {
    /// Number of containers currently tracked in the registry.
    pub active_count: usize,
    /// Total number of containers successfully created since manager init.
    pub total_created: u64,
    /// Number of provisioning operations that failed.
    pub failed_count: u64,
}

/// Registry entry for one container created by this application.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerRecord {
    /// Engine-assigned container id.
    pub id: String,
    /// Human label carrying owner/match/timestamp for traceability.
    pub name: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
    /// Address assigned by the engine's network, when known.
    pub ip_address: Option<String>,
    pub owner: OwnerLabels,
}

/// Outcome of a session-aware launch. The session always exists; the
/// container is absent when provisioning failed and the client should
/// run against the simulated terminal instead.
#[derive(Debug, Clone)]
pub struct Launch {
    pub session: TerminalSession,
    pub container: Option<ContainerRecord>,
    pub simulated: bool,
}
