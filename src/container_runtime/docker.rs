//! Docker implementation of the [`ContainerRuntime`] trait.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, info};

use super::types::{
    AttachedIo, ContainerSpec, ContainerStatus, ContainerSummary, InspectedContainer, OwnerLabels,
    LABEL_APP,
};
use super::ContainerRuntime;
use crate::error_handling::types::RuntimeError;

/// Thin client over the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects to the local daemon and verifies it answers.
    pub async fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        let version = docker
            .version()
            .await
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        info!(
            "Connected to Docker daemon (version: {})",
            version.version.unwrap_or_else(|| "unknown".to_string())
        );

        Ok(DockerRuntime { docker })
    }

    fn translate(err: bollard::errors::Error) -> RuntimeError {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => RuntimeError::Api(format!("engine returned {}: {}", status_code, message)),
            other => RuntimeError::Unavailable(other.to_string()),
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        debug!("Creating container {} from image {}", spec.name, spec.image);

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(vec!["/bin/bash".to_string()]),
            tty: Some(true),
            open_stdin: Some(true),
            stdin_once: Some(false),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                auto_remove: Some(true),
                network_mode: Some("bridge".to_string()),
                cap_add: Some(vec!["NET_ADMIN".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| match e {
                // A missing image surfaces as a 404 on create.
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    message,
                } => RuntimeError::ImageInvalid(message),
                other => Self::translate(other),
            })?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(Self::translate)
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: 5 }))
            .await
            .map_err(Self::translate)
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        match self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            // Auto-remove containers disappear on stop; nothing left to do.
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(Self::translate(e)),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<InspectedContainer, RuntimeError> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(Self::translate)?;

        use bollard::models::ContainerStateStatusEnum;
        let status = match details.state.as_ref().and_then(|s| s.status) {
            Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
            Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
            Some(_) => ContainerStatus::Exited,
            None => ContainerStatus::NotFound,
        };

        let ip_address = details
            .network_settings
            .as_ref()
            .and_then(|n| n.ip_address.clone())
            .filter(|ip| !ip.is_empty());

        let labels = details
            .config
            .as_ref()
            .and_then(|c| c.labels.clone())
            .unwrap_or_default();

        Ok(InspectedContainer {
            id: details.id.unwrap_or_else(|| id.to_string()),
            status,
            ip_address,
            labels,
        })
    }

    async fn list_labeled(
        &self,
        all: bool,
        app_label: &str,
    ) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", LABEL_APP, app_label)],
        );

        let options = ListContainersOptions {
            all,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(Self::translate)?;

        let mut summaries = Vec::with_capacity(containers.len());
        for container in containers {
            let id = match container.id {
                Some(id) => id,
                None => continue,
            };
            let labels = container.labels.unwrap_or_default();

            // The list endpoint does not report addresses; best-effort
            // inspect fills them in.
            let ip_address = self
                .inspect_container(&id)
                .await
                .ok()
                .and_then(|d| d.ip_address);

            summaries.push(ContainerSummary {
                name: container
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                image: container.image.unwrap_or_default(),
                status: ContainerStatus::from_engine(container.state.as_deref().unwrap_or("")),
                created_at: container
                    .created
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
                    .unwrap_or_default(),
                ip_address,
                owner: OwnerLabels::from_map(&labels),
                id,
            });
        }

        debug!("Listed {} labeled containers (all={})", summaries.len(), all);
        Ok(summaries)
    }

    async fn attach(&self, id: &str) -> Result<AttachedIo, RuntimeError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(vec!["/bin/bash".to_string()]),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    env: Some(vec!["TERM=xterm-256color".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .map_err(Self::translate)?;

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(Self::translate)?
        {
            StartExecResults::Attached { output, input } => {
                let output = output.map(|item| {
                    item.map(|log| log.into_bytes().to_vec())
                        .map_err(Self::translate)
                });
                Ok(AttachedIo {
                    output: Box::pin(output),
                    input,
                })
            }
            StartExecResults::Detached => Err(RuntimeError::Api(
                "exec started detached, no stream available".to_string(),
            )),
        }
    }
}
