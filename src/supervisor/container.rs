//! Agent-runner sandboxed container lifecycle (spec §4.7): `docker run -d`
//! with a fixed name, host networking on Linux / bridge networking plus
//! `host.docker.internal` elsewhere, liveness via `docker ps` + optional
//! HEALTHCHECK status, and `docker stop` on shutdown.
//!
//! Talks to the Docker engine API directly through `bollard` rather than
//! shelling out to the `docker` CLI the spec prose describes — the crate
//! the pack's supervisor-shaped dependency stack already carries for this
//! exact role.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::models::{ContainerStateStatusEnum, HostConfig};
use bollard::Docker;
use futures::Stream;
use tracing::info;

use crate::error::{Result, StigmerError};

fn map_bollard_err(err: bollard::errors::Error) -> StigmerError {
    StigmerError::unavailable(format!("docker: {err}"))
}

pub struct ContainerSupervisor {
    docker: Docker,
    pub name: String,
}

impl ContainerSupervisor {
    pub fn connect(name: impl Into<String>) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(map_bollard_err)?;
        Ok(ContainerSupervisor {
            docker,
            name: name.into(),
        })
    }

    /// Removes any existing container under this name, then starts a fresh
    /// one from `image` with the given environment variables and backend
    /// port exposed per spec §4.7's networking rule. Returns the new
    /// container id.
    pub async fn run(&self, image: &str, env: &[(String, String)], backend_port: u16) -> Result<String> {
        let _ = self
            .docker
            .remove_container(
                &self.name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        let env_vars: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let host_config = if cfg!(target_os = "linux") {
            HostConfig {
                network_mode: Some("host".to_string()),
                ..Default::default()
            }
        } else {
            HostConfig {
                network_mode: Some("bridge".to_string()),
                extra_hosts: Some(vec!["host.docker.internal:host-gateway".to_string()]),
                port_bindings: Some(HashMap::from([(
                    format!("{backend_port}/tcp"),
                    Some(vec![bollard::models::PortBinding {
                        host_ip: Some("127.0.0.1".to_string()),
                        host_port: Some(backend_port.to_string()),
                    }]),
                )])),
                ..Default::default()
            }
        };

        let config = Config {
            image: Some(image.to_string()),
            env: Some(env_vars),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: self.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(map_bollard_err)?;

        self.docker
            .start_container(&self.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_bollard_err)?;

        info!(container = %self.name, id = %created.id, "agent-runner container started");
        Ok(created.id)
    }

    /// `docker ps` liveness plus HEALTHCHECK status if the image defines
    /// one (spec §4.7 liveness probe for the agent-runner component).
    pub async fn is_healthy(&self) -> Result<bool> {
        let filters = HashMap::from([("name".to_string(), vec![self.name.clone()])]);
        let running = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: false,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(map_bollard_err)?;
        if running.is_empty() {
            return Ok(false);
        }

        let inspect = self.docker.inspect_container(&self.name, None).await.map_err(map_bollard_err)?;
        let Some(state) = inspect.state else {
            return Ok(true);
        };
        if state.status != Some(ContainerStateStatusEnum::RUNNING) {
            return Ok(false);
        }
        match state.health.and_then(|h| h.status) {
            Some(bollard::models::HealthStatusEnum::UNHEALTHY) => Ok(false),
            _ => Ok(true),
        }
    }

    pub async fn exists_and_running(&self) -> Result<bool> {
        self.is_healthy().await
    }

    pub async fn stop(&self, timeout_secs: i64) -> Result<()> {
        self.docker
            .stop_container(&self.name, Some(StopContainerOptions { t: timeout_secs }))
            .await
            .map_err(map_bollard_err)?;
        Ok(())
    }

    /// `docker logs -f <name>` equivalent, used by the log streamer (spec
    /// §4.8) to follow container output across restarts.
    pub fn follow_logs(&self) -> impl Stream<Item = Result<bollard::container::LogOutput>> + '_ {
        use futures::StreamExt;
        self.docker
            .logs(
                &self.name,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    tail: "0".to_string(),
                    ..Default::default()
                }),
            )
            .map(|item| item.map_err(map_bollard_err))
    }
}
