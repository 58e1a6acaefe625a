use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::RwLock;

use crate::configuration::RuntimeConfig;
use crate::error_handling::types::RuntimeError;
use crate::runtime::engine::ContainerRuntime;
use crate::runtime::types::{AttackerEndpoint, BulkOutcome};

/// Docker adapter for the container runtime seam.
///
/// The engine connection is created on first use and cached. All managed
/// containers carry an `app` label so bulk operations and IP attribution can
/// be scoped without tracking engine ids separately.
pub struct DockerRuntime {
    config: RuntimeConfig,
    docker: Arc<RwLock<Option<Docker>>>,
    /// Network attackers and victims share, detected once per process.
    network: Arc<RwLock<Option<String>>>,
}

impl DockerRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            docker: Arc::new(RwLock::new(None)),
            network: Arc::new(RwLock::new(None)),
        }
    }

    async fn docker(&self) -> Result<Docker, RuntimeError> {
        {
            let guard = self.docker.read().await;
            if let Some(ref d) = *guard {
                return Ok(d.clone());
            }
        }
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::EngineUnreachable(e.to_string()))?;
        *self.docker.write().await = Some(docker.clone());
        Ok(docker)
    }

    /// Resolves the network managed containers should join.
    ///
    /// When the orchestrator itself runs in a container its own first network
    /// is used, so attackers land next to it. Outside a container (or when
    /// detection fails) the configured default applies.
    async fn game_network(&self) -> Result<String, RuntimeError> {
        {
            let guard = self.network.read().await;
            if let Some(ref name) = *guard {
                return Ok(name.clone());
            }
        }
        let detected = match std::env::var("HOSTNAME") {
            Ok(hostname) => {
                let docker = self.docker().await?;
                match docker.inspect_container(&hostname, None).await {
                    Ok(inspect) => inspect
                        .network_settings
                        .and_then(|ns| ns.networks)
                        .and_then(|nets| nets.keys().next().cloned()),
                    Err(e) => {
                        debug!("own-container inspect failed ({}), using default network", e);
                        None
                    }
                }
            }
            Err(_) => None,
        };
        let network = detected.unwrap_or_else(|| self.config.default_network.clone());
        info!("managed containers will join network '{}'", network);
        *self.network.write().await = Some(network.clone());
        Ok(network)
    }

    fn labels(&self, type_label: &str) -> HashMap<String, String> {
        HashMap::from([
            ("app".to_string(), self.config.app_label.clone()),
            ("type".to_string(), type_label.to_string()),
        ])
    }

    fn attacker_filters(&self) -> HashMap<String, Vec<String>> {
        HashMap::from([(
            "label".to_string(),
            vec![
                format!("app={}", self.config.app_label),
                format!("type={}", self.config.attacker_label),
            ],
        )])
    }

    async fn list_attacker_ids(&self) -> Result<Vec<String>, RuntimeError> {
        let docker = self.docker().await?;
        let summaries = docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters: self.attacker_filters(),
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::InspectFailed(e.to_string()))?;
        Ok(summaries.into_iter().filter_map(|s| s.id).collect())
    }

    /// Waits for the terminal service behind a freshly published host port.
    /// Bounded retry with progressive backoff, capped at three seconds.
    async fn wait_for_service(&self, host_port: u16, runtime_id: &str) -> Result<(), RuntimeError> {
        let target_addr = format!("127.0.0.1:{}", host_port);
        let max_attempts = self.config.ready_wait_max_attempts;
        let mut attempts = 0;

        while attempts < max_attempts {
            match TcpStream::connect(&target_addr).await {
                Ok(_) => {
                    debug!("terminal service reachable at {} for {}", target_addr, runtime_id);
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;
                    let wait_ms = std::cmp::min(500 + u64::from(attempts) * 200, 3000);
                    debug!(
                        "connect attempt {}/{} to {} failed: {} - retrying in {}ms",
                        attempts, max_attempts, target_addr, e, wait_ms
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(wait_ms)).await;
                }
            }
        }

        Err(RuntimeError::ServiceNotReady(format!(
            "{} at {} after {} attempts",
            runtime_id, target_addr, max_attempts
        )))
    }

    /// Builds the victim image for a level from its on-disk build context.
    async fn build_victim_image(&self, image_tag: &str, level_key: &str) -> Result<(), RuntimeError> {
        let context_dir = self.config.victim_context_dir.join(level_key);
        if !context_dir.is_dir() {
            return Err(RuntimeError::ImageBuildFailed(format!(
                "no build context for level '{}' at {}",
                level_key,
                context_dir.display()
            )));
        }

        let mut archive = tar::Builder::new(Vec::new());
        archive
            .append_dir_all(".", &context_dir)
            .map_err(|e| RuntimeError::ImageBuildFailed(e.to_string()))?;
        let tar_bytes = archive
            .into_inner()
            .map_err(|e| RuntimeError::ImageBuildFailed(e.to_string()))?;

        info!("building victim image '{}' for level '{}'", image_tag, level_key);
        let docker = self.docker().await?;
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: image_tag.to_string(),
            rm: true,
            ..Default::default()
        };
        let mut stream = docker.build_image(options, None, Some(tar_bytes.into()));
        while let Some(chunk) = stream.next().await {
            let info = chunk.map_err(|e| RuntimeError::ImageBuildFailed(e.to_string()))?;
            if let Some(error) = info.error {
                return Err(RuntimeError::ImageBuildFailed(error));
            }
        }
        Ok(())
    }

    fn victim_image_tag(level_key: &str) -> String {
        format!("mits-victim-{}:latest", level_key)
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_attacker(&self, name: &str) -> Result<AttackerEndpoint, RuntimeError> {
        let docker = self.docker().await?;
        let network = self.game_network().await?;
        let service_port = format!("{}/tcp", self.config.attacker_service_port);

        let host_config = HostConfig {
            port_bindings: Some(HashMap::from([(
                service_port.clone(),
                Some(vec![PortBinding {
                    host_ip: None,
                    // "0" asks the engine for any free host port.
                    host_port: Some("0".to_string()),
                }]),
            )])),
            network_mode: Some(network),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(self.config.attacker_image.clone()),
            exposed_ports: Some(HashMap::from([(service_port.clone(), HashMap::new())])),
            labels: Some(self.labels(&self.config.attacker_label)),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            ..Default::default()
        };
        let response = docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| RuntimeError::CreationFailed(format!("{}: {}", name, e)))?;
        let runtime_id = response.id;

        docker
            .start_container::<String>(&runtime_id, None)
            .await
            .map_err(|e| RuntimeError::StartFailed(format!("{}: {}", name, e)))?;

        // The dynamic port only shows up on inspect after start.
        let inspect = docker
            .inspect_container(&runtime_id, None)
            .await
            .map_err(|e| RuntimeError::InspectFailed(format!("{}: {}", runtime_id, e)))?;
        let host_port = inspect
            .network_settings
            .and_then(|ns| ns.ports)
            .and_then(|ports| ports.get(&service_port).cloned().flatten())
            .and_then(|bindings| bindings.into_iter().next())
            .and_then(|binding| binding.host_port)
            .and_then(|port| port.parse::<u16>().ok())
            .ok_or_else(|| RuntimeError::PortNotAssigned(runtime_id.clone()))?;

        self.wait_for_service(host_port, &runtime_id).await?;

        let short_id: String = runtime_id.chars().take(12).collect();
        let terminal_url = format!(
            "http://{}:{}/{}/",
            self.config.terminal_host, host_port, short_id
        );
        info!("attacker {} ready at {}", short_id, terminal_url);

        Ok(AttackerEndpoint {
            runtime_id,
            short_id,
            host_port,
            terminal_url,
        })
    }

    async fn ensure_victim(
        &self,
        service_name: &str,
        level_key: &str,
    ) -> Result<(), RuntimeError> {
        let docker = self.docker().await?;

        // Already running under this exact name means nothing to do.
        if let Ok(inspect) = docker.inspect_container(service_name, None).await {
            let running = inspect
                .state
                .and_then(|s| s.running)
                .unwrap_or(false);
            if running {
                debug!("victim '{}' already running", service_name);
                return Ok(());
            }
            // A stale stopped victim from an earlier session gets replaced.
            docker
                .remove_container(
                    service_name,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
                .map_err(|e| RuntimeError::RemoveFailed(format!("{}: {}", service_name, e)))?;
        }

        let image_tag = Self::victim_image_tag(level_key);
        if docker.inspect_image(&image_tag).await.is_err() {
            self.build_victim_image(&image_tag, level_key).await?;
        }

        let network = self.game_network().await?;
        let container_config = Config {
            image: Some(image_tag),
            labels: Some(self.labels(&self.config.victim_label)),
            host_config: Some(HostConfig {
                network_mode: Some(network),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: service_name.to_string(),
            ..Default::default()
        };
        let response = docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| RuntimeError::CreationFailed(format!("{}: {}", service_name, e)))?;
        docker
            .start_container::<String>(&response.id, None)
            .await
            .map_err(|e| RuntimeError::StartFailed(format!("{}: {}", service_name, e)))?;
        info!("victim '{}' started", service_name);
        Ok(())
    }

    async fn remove_container(&self, runtime_id: &str) -> Result<(), RuntimeError> {
        let docker = self.docker().await?;
        if let Err(e) = docker
            .stop_container(runtime_id, Some(StopContainerOptions { t: 5 }))
            .await
        {
            // Already stopped is fine; force-remove below handles the rest.
            debug!("stop of {} failed: {}", runtime_id, e);
        }
        docker
            .remove_container(
                runtime_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| RuntimeError::RemoveFailed(format!("{}: {}", runtime_id, e)))?;
        Ok(())
    }

    async fn stop_attackers(&self) -> Result<BulkOutcome, RuntimeError> {
        let docker = self.docker().await?;
        let ids = self.list_attacker_ids().await?;
        let mut outcome = BulkOutcome {
            matched: ids.len(),
            failed: 0,
        };
        for id in ids {
            if let Err(e) = docker
                .stop_container(&id, Some(StopContainerOptions { t: 5 }))
                .await
            {
                warn!("failed to stop attacker {}: {}", id, e);
                outcome.failed += 1;
            }
        }
        Ok(outcome)
    }

    async fn start_attackers(&self) -> Result<BulkOutcome, RuntimeError> {
        let docker = self.docker().await?;
        let ids = self.list_attacker_ids().await?;
        let mut outcome = BulkOutcome {
            matched: ids.len(),
            failed: 0,
        };
        for id in ids {
            if let Err(e) = docker.start_container::<String>(&id, None).await {
                warn!("failed to start attacker {}: {}", id, e);
                outcome.failed += 1;
            }
        }
        Ok(outcome)
    }

    async fn remove_attackers(&self) -> Result<BulkOutcome, RuntimeError> {
        let docker = self.docker().await?;
        let ids = self.list_attacker_ids().await?;
        let mut outcome = BulkOutcome {
            matched: ids.len(),
            failed: 0,
        };
        for id in ids {
            if let Err(e) = docker
                .remove_container(
                    &id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
            {
                warn!("failed to remove attacker {}: {}", id, e);
                outcome.failed += 1;
            }
        }
        Ok(outcome)
    }

    async fn attacker_for_ip(&self, ip: &str) -> Result<Option<String>, RuntimeError> {
        let docker = self.docker().await?;
        let summaries = docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                filters: self.attacker_filters(),
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::InspectFailed(e.to_string()))?;

        for summary in summaries {
            let Some(id) = summary.id else { continue };
            let inspect = match docker.inspect_container(&id, None).await {
                Ok(i) => i,
                Err(e) => {
                    debug!("inspect of {} failed during attribution: {}", id, e);
                    continue;
                }
            };
            let networks = inspect
                .network_settings
                .and_then(|ns| ns.networks)
                .unwrap_or_default();
            if networks
                .values()
                .any(|net| net.ip_address.as_deref() == Some(ip))
            {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}
