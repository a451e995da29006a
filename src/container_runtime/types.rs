//! Core types exchanged with the container engine client.

use std::collections::HashMap;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use tokio::io::AsyncWrite;

use crate::error_handling::types::RuntimeError;

/// Engine-reported container state, collapsed to the states the rest of
/// the system cares about. Anything the engine cannot answer for maps
/// to `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Created,
    Running,
    Exited,
    NotFound,
}

impl ContainerStatus {
    pub fn from_engine(raw: &str) -> Self {
        match raw {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "" => ContainerStatus::NotFound,
            _ => ContainerStatus::Exited,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Exited => "exited",
            ContainerStatus::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership metadata attached to every container we create, and read
/// back when enumerating. `match_id` 0 means a standalone lab sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct OwnerLabels {
    pub user_id: i64,
    pub match_id: i64,
    pub session_id: i64,
}

pub const LABEL_APP: &str = "app";
pub const LABEL_USER_ID: &str = "user_id";
pub const LABEL_MATCH_ID: &str = "match_id";
pub const LABEL_SESSION_ID: &str = "session_id";

impl OwnerLabels {
    /// Expands into the label map stamped onto the container.
    pub fn to_map(&self, app_label: &str) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert(LABEL_APP.to_string(), app_label.to_string());
        labels.insert(LABEL_USER_ID.to_string(), self.user_id.to_string());
        labels.insert(LABEL_MATCH_ID.to_string(), self.match_id.to_string());
        labels.insert(LABEL_SESSION_ID.to_string(), self.session_id.to_string());
        labels
    }

    /// Reconstructs owner metadata from engine labels. Absent or
    /// malformed values become 0 rather than an error: labels are
    /// advisory once the `app` filter has matched.
    pub fn from_map(labels: &HashMap<String, String>) -> Self {
        let parse = |key: &str| {
            labels
                .get(key)
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
        };
        OwnerLabels {
            user_id: parse(LABEL_USER_ID),
            match_id: parse(LABEL_MATCH_ID),
            session_id: parse(LABEL_SESSION_ID),
        }
    }
}

/// Everything needed to create one sandbox container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
}

/// Snapshot from inspecting a single container.
#[derive(Debug, Clone)]
pub struct InspectedContainer {
    pub id: String,
    pub status: ContainerStatus,
    pub ip_address: Option<String>,
    pub labels: HashMap<String, String>,
}

/// One row of a label-filtered container enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub created_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub owner: OwnerLabels,
}

/// Byte stream coming out of an attached container TTY.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, RuntimeError>> + Send>>;

/// Byte sink feeding the attached container TTY.
pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Live bidirectional I/O handles for one attached container.
pub struct AttachedIo {
    pub output: OutputStream,
    pub input: InputSink,
}
