use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};

use crate::configuration::config::Config;
use crate::container_management::container_manager::ContainerManager;
use crate::container_runtime::{ContainerRuntime, DockerRuntime, UnavailableRuntime};
use crate::error_handling::types::ControllerError;
use crate::matchmaking::duel::DuelService;
use crate::matchmaking::queue::MatchQueue;
use crate::session_management::session_registry::SessionRegistry;
use crate::storage::database_storage::DatabaseStorage;
use crate::storage::storage_trait::Storage;
use crate::web_interface::types::WebState;
use crate::web_interface::web_server::WebServer;

/// Boots every subsystem and runs the server.
pub struct Controller {
    pub config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Controller { config }
    }

    pub async fn run(&mut self) -> Result<(), ControllerError> {
        info!("Starting arena controller");

        let storage: Arc<dyn Storage> =
            Arc::new(DatabaseStorage::new_file(&self.config.database_path).await?);

        // When the engine is unreachable at startup the service still
        // comes up; every terminal just runs in simulated mode until a
        // restart with a healthy engine.
        let runtime: Arc<dyn ContainerRuntime> = match DockerRuntime::connect().await {
            Ok(docker) => Arc::new(docker),
            Err(e) => {
                warn!(
                    "Container engine unreachable ({}); terminals will run in simulated mode",
                    e
                );
                Arc::new(UnavailableRuntime::new(e.to_string()))
            }
        };

        let sessions = Arc::new(SessionRegistry::new(
            storage.clone(),
            self.config.sessions.ttl_secs,
        ));
        let containers = Arc::new(ContainerManager::new(
            runtime,
            sessions.clone(),
            self.config.runtime.app_label.clone(),
        ));
        let queue = Arc::new(MatchQueue::new(
            storage.clone(),
            self.config.duels.queue_ttl_secs,
        ));
        let duels = Arc::new(DuelService::new(
            storage.clone(),
            queue.clone(),
            containers.clone(),
            self.config.runtime.default_image.clone(),
            self.config.duels.default_score_change,
            self.config.duels.challenge_ttl_secs,
        ));

        self.spawn_sweeps(
            storage.clone(),
            sessions.clone(),
            containers.clone(),
            queue.clone(),
        );

        let state = WebState {
            sessions,
            containers,
            duels,
            default_image: self.config.runtime.default_image.clone(),
        };
        WebServer::new(state)
            .start(&self.config.bind_address, self.config.port)
            .await?;
        Ok(())
    }

    /// Periodic maintenance: session expiry, container age cleanup,
    /// queue pruning and challenge expiry. Each sweep runs on its own
    /// task so a slow engine call never blocks the others.
    fn spawn_sweeps(
        &self,
        storage: Arc<dyn Storage>,
        sessions: Arc<SessionRegistry>,
        containers: Arc<ContainerManager>,
        queue: Arc<MatchQueue>,
    ) {
        let session_interval = self.config.sessions.sweep_interval_secs;
        let stop_on_expiry = self.config.sessions.stop_on_expiry;
        let sweep_containers = containers.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(session_interval.max(1)));
            loop {
                ticker.tick().await;
                let closed = sessions.sweep_expired().await;
                if stop_on_expiry {
                    for session in closed {
                        if session.has_container() {
                            sweep_containers.stop_container(&session.container_id).await;
                        }
                    }
                }
            }
        });

        let cleanup_interval = self.config.runtime.cleanup_interval_secs;
        let max_age = chrono::Duration::seconds(self.config.runtime.container_max_age_secs as i64);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(cleanup_interval.max(1)));
            loop {
                ticker.tick().await;
                containers.cleanup(max_age).await;
            }
        });

        let queue_interval = self.config.duels.queue_ttl_secs.max(30);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(queue_interval));
            loop {
                ticker.tick().await;
                queue.prune().await;
                if let Err(e) = storage.expire_stale_challenges(Utc::now()).await {
                    warn!("Challenge expiry sweep failed: {}", e);
                }
            }
        });
    }
}
