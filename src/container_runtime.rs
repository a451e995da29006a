//! Container engine client.
//!
//! This module is the only place that talks to the container engine.
//! Everything above it sees the [`ContainerRuntime`] trait and the
//! translated [`RuntimeError`](crate::error_handling::types::RuntimeError)
//! taxonomy; no engine library type crosses this boundary.
//!
//! Implementations:
//! - [`DockerRuntime`]: the real client, backed by the Docker API.
//! - [`UnavailableRuntime`]: stand-in used when the engine cannot be
//!   reached at startup, so every caller degrades to simulated mode
//!   instead of failing outright.

pub mod docker;
pub mod types;

use async_trait::async_trait;

use crate::error_handling::types::RuntimeError;
use types::{AttachedIo, ContainerSpec, ContainerSummary, InspectedContainer};

pub use docker::DockerRuntime;

/// Create/start/stop/inspect/attach/list primitives against a container
/// engine. All methods are I/O-bound and must not assume the engine is
/// reachable.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates a container from `spec` and returns the engine-assigned id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stops a running container.
    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Removes a container. Not an error if the engine already removed it.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Reports status, address and labels for a container.
    async fn inspect_container(&self, id: &str) -> Result<InspectedContainer, RuntimeError>;

    /// Enumerates containers carrying our `app` ownership label.
    async fn list_labeled(
        &self,
        all: bool,
        app_label: &str,
    ) -> Result<Vec<ContainerSummary>, RuntimeError>;

    /// Attaches to the container's interactive TTY.
    async fn attach(&self, id: &str) -> Result<AttachedIo, RuntimeError>;
}

/// Runtime stand-in used when the engine was unreachable at startup.
/// Every call fails with `RuntimeError::Unavailable`, which the layers
/// above translate into the simulated-terminal fallback.
pub struct UnavailableRuntime {
    reason: String,
}

impl UnavailableRuntime {
    pub fn new(reason: impl Into<String>) -> Self {
        UnavailableRuntime {
            reason: reason.into(),
        }
    }

    fn err(&self) -> RuntimeError {
        RuntimeError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl ContainerRuntime for UnavailableRuntime {
    async fn create_container(&self, _spec: &ContainerSpec) -> Result<String, RuntimeError> {
        Err(self.err())
    }

    async fn start_container(&self, _id: &str) -> Result<(), RuntimeError> {
        Err(self.err())
    }

    async fn stop_container(&self, _id: &str) -> Result<(), RuntimeError> {
        Err(self.err())
    }

    async fn remove_container(&self, _id: &str) -> Result<(), RuntimeError> {
        Err(self.err())
    }

    async fn inspect_container(&self, _id: &str) -> Result<InspectedContainer, RuntimeError> {
        Err(self.err())
    }

    async fn list_labeled(
        &self,
        _all: bool,
        _app_label: &str,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        Err(self.err())
    }

    async fn attach(&self, _id: &str) -> Result<AttachedIo, RuntimeError> {
        Err(self.err())
    }
}
