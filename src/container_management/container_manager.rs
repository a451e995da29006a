use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::container_management::types::{ContainerRecord, ContainerStats, Launch};
use crate::container_runtime::types::{
    AttachedIo, ContainerSpec, ContainerStatus, ContainerSummary, OwnerLabels,
};
use crate::container_runtime::ContainerRuntime;
use crate::error_handling::types::ContainerError;
use crate::session_management::session_registry::SessionRegistry;

/// Orchestrates container lifecycle and bookkeeping for sandbox
/// sessions.
///
/// The manager is the only component holding a live handle to the
/// container runtime; sessions, bridges and the matchmaking service all
/// reach containers through it. It keeps a registry of the containers
/// it created, stamps every one with ownership labels, and cascades a
/// container stop into invalidation of every session bound to it.
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    sessions: Arc<SessionRegistry>,
    containers: RwLock<HashMap<String, ContainerRecord>>,
    app_label: String,
    total_created: AtomicU64,
    failed_count: AtomicU64,
}

impl ContainerManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        sessions: Arc<SessionRegistry>,
        app_label: impl Into<String>,
    ) -> Self {
        let app_label = app_label.into();
        info!("Initializing ContainerManager (app label: {})", app_label);
        ContainerManager {
            runtime,
            sessions,
            containers: RwLock::new(HashMap::new()),
            app_label,
            total_created: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
        }
    }

    /// Provisions and starts a new container, registers it, and returns
    /// its record.
    pub async fn create_container(
        &self,
        image: &str,
        owner: OwnerLabels,
    ) -> Result<ContainerRecord, ContainerError> {
        let name = format!(
            "{}_u{}_m{}_{}",
            self.app_label,
            owner.user_id,
            owner.match_id,
            &uuid::Uuid::new_v4().to_string()[..8]
        );
        debug!("Creating container {} from image {}", name, image);

        let spec = ContainerSpec {
            name: name.clone(),
            image: image.to_string(),
            labels: owner.to_map(&self.app_label),
        };

        let container_id = match self.runtime.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => {
                self.failed_count.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        if let Err(e) = self.runtime.start_container(&container_id).await {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
            // Don't leave a created-but-never-started container behind.
            if let Err(remove_err) = self.runtime.remove_container(&container_id).await {
                debug!(
                    "Failed to remove unstarted container {}: {}",
                    container_id, remove_err
                );
            }
            return Err(e.into());
        }

        // Best-effort inspect for the runtime-assigned address.
        let ip_address = self
            .runtime
            .inspect_container(&container_id)
            .await
            .ok()
            .and_then(|d| d.ip_address);

        let record = ContainerRecord {
            id: container_id.clone(),
            name,
            image: image.to_string(),
            created_at: Utc::now(),
            ip_address,
            owner,
        };

        self.containers
            .write()
            .await
            .insert(container_id.clone(), record.clone());
        self.total_created.fetch_add(1, Ordering::Relaxed);

        info!("Container created and registered: {}", container_id);
        Ok(record)
    }

    /// Session-aware launch: mints the terminal session first, then
    /// provisions a container and binds it. When provisioning fails the
    /// session survives with its pending binding and the caller is told
    /// to use the simulated terminal.
    pub async fn launch(&self, image: &str, user_id: i64, match_id: i64) -> Launch {
        let session = self.sessions.create_session(user_id, match_id).await;
        let owner = OwnerLabels {
            user_id,
            match_id,
            session_id: session.id,
        };

        match self.create_container(image, owner).await {
            Ok(record) => {
                self.sessions.bind_container(session.id, &record.id).await;
                let session = self.sessions.get(session.id).await.unwrap_or(session);
                Launch {
                    session,
                    container: Some(record),
                    simulated: false,
                }
            }
            Err(e) => {
                warn!(
                    "Container provisioning failed for user {} ({}); serving simulated terminal",
                    user_id, e
                );
                Launch {
                    session,
                    container: None,
                    simulated: true,
                }
            }
        }
    }

    /// Mints a session against an already-running container we own.
    /// The ownership decision (owner or admin) is the route layer's,
    /// made against the returned record's labels before calling this.
    pub async fn connect_existing(
        &self,
        container_id: &str,
        user_id: i64,
    ) -> Result<Launch, ContainerError> {
        let record = self
            .get_record(container_id)
            .await
            .ok_or_else(|| ContainerError::UnknownContainer(container_id.to_string()))?;

        let status = self.check_status(container_id).await;
        if status != ContainerStatus::Running {
            return Err(ContainerError::NotRunning(status.as_str().to_string()));
        }

        let session = self
            .sessions
            .create_session(user_id, record.owner.match_id)
            .await;
        self.sessions.bind_container(session.id, container_id).await;
        let session = self.sessions.get(session.id).await.unwrap_or(session);

        info!(
            "Session {} attached to existing container {}",
            session.id, container_id
        );
        Ok(Launch {
            session,
            container: Some(record),
            simulated: false,
        })
    }

    /// Stops and deregisters a container, invalidating every session
    /// bound to it. Idempotent: `false` when the container is unknown
    /// to this manager; engine-side "already stopped" is not an error.
    pub async fn stop_container(&self, container_id: &str) -> bool {
        let record = self.containers.write().await.remove(container_id);
        if record.is_none() {
            debug!("Stop requested for unmanaged container {}", container_id);
            return false;
        }

        if let Err(e) = self.runtime.stop_container(container_id).await {
            warn!("Failed to stop container {}: {}", container_id, e);
        }
        if let Err(e) = self.runtime.remove_container(container_id).await {
            debug!("Failed to remove container {}: {}", container_id, e);
        }

        let invalidated = self.sessions.invalidate_for_container(container_id).await;
        info!(
            "Container {} stopped and deregistered ({} session(s) invalidated)",
            container_id, invalidated
        );
        true
    }

    /// Read-through status check. Never errors: an unreachable engine
    /// or an absent container both report `not_found`.
    pub async fn check_status(&self, container_id: &str) -> ContainerStatus {
        match self.runtime.inspect_container(container_id).await {
            Ok(details) => details.status,
            Err(e) => {
                debug!("Status check failed for {}: {}", container_id, e);
                ContainerStatus::NotFound
            }
        }
    }

    /// Enumerates containers carrying our ownership label, optionally
    /// including stopped ones.
    pub async fn list_owned(&self, all: bool) -> Result<Vec<ContainerSummary>, ContainerError> {
        Ok(self.runtime.list_labeled(all, &self.app_label).await?)
    }

    /// Attaches to a container's live TTY.
    pub async fn attach(&self, container_id: &str) -> Result<AttachedIo, ContainerError> {
        Ok(self.runtime.attach(container_id).await?)
    }

    /// Sweeps registry entries older than `max_age`. The cutoff is
    /// computed once at sweep start, so containers created while the
    /// sweep runs are never candidates.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let stale: Vec<String> = self
            .containers
            .read()
            .await
            .values()
            .filter(|r| r.created_at < cutoff)
            .map(|r| r.id.clone())
            .collect();

        let mut removed = 0;
        for container_id in stale {
            if self.stop_container(&container_id).await {
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Cleanup completed: {} container(s) removed", removed);
        }
        removed
    }

    pub async fn get_record(&self, container_id: &str) -> Option<ContainerRecord> {
        self.containers.read().await.get(container_id).cloned()
    }

    /// Snapshot of current counters. `active_count` is computed from
    /// the registry to stay accurate.
    pub async fn get_container_stats(&self) -> ContainerStats {
        ContainerStats {
            active_count: self.containers.read().await.len(),
            total_created: self.total_created.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ContainerManager {
    fn drop(&mut self) {
        if let Ok(containers) = self.containers.try_read() {
            if !containers.is_empty() {
                warn!(
                    "ContainerManager dropped with {} tracked containers - this may indicate a resource leak",
                    containers.len()
                );
            } else {
                debug!("ContainerManager dropped cleanly with no tracked containers");
            }
        }
    }
}
