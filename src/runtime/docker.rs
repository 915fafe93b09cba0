use std::collections::HashMap;

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::secret::{
    HostConfig, PortBinding, PortMap, RestartPolicy as EngineRestartPolicy, RestartPolicyNameEnum,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use tracing::{debug, info, trace};

use super::{ContainerResult, InspectResponse, Runtime, RuntimeError};
use crate::task::{Config, HostPort, RestartPolicy};

/// Adapter over the local Docker socket via bollard.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let client = Docker::connect_with_unix_defaults()
            .map_err(|e| RuntimeError::Connection(e.to_string()))?;
        Ok(DockerRuntime { client })
    }
}

impl Runtime for DockerRuntime {
    async fn run(&self, config: &Config) -> ContainerResult {
        debug!(image = %config.image, "pulling image");
        let mut pull = self.client.create_image(
            Some(CreateImageOptions {
                from_image: config.image.clone(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            match progress {
                Ok(update) => {
                    if let Some(status) = update.status {
                        trace!(%status, "pull progress");
                    }
                }
                Err(e) => return ContainerResult::failure(RuntimeError::ImagePull(e.to_string())),
            }
        }

        let mut exposed: HashMap<String, HashMap<(), ()>> = HashMap::new();
        let mut bindings: PortMap = HashMap::new();
        for mapping in &config.exposed_ports {
            let key = format!("{}/{}", mapping.container_port, mapping.protocol);
            exposed.insert(key.clone(), HashMap::new());
            if mapping.host_port != 0 {
                bindings.insert(
                    key,
                    Some(vec![PortBinding {
                        host_ip: None,
                        host_port: Some(mapping.host_port.to_string()),
                    }]),
                );
            }
        }

        let host_config = HostConfig {
            restart_policy: Some(EngineRestartPolicy {
                name: Some(restart_policy_name(config.restart_policy)),
                maximum_retry_count: None,
            }),
            cpu_shares: (config.cpu > 0).then_some(config.cpu as i64),
            memory: (config.memory > 0).then_some(config.memory as i64),
            // Ports without an explicit host side get engine-assigned ones.
            publish_all_ports: Some(bindings.is_empty()),
            port_bindings: (!bindings.is_empty()).then_some(bindings),
            ..Default::default()
        };

        let container_config = ContainerConfig {
            image: Some(config.image.clone()),
            env: Some(config.env.clone()),
            exposed_ports: Some(exposed),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: config.name.clone(),
            ..Default::default()
        });
        let id = match self.client.create_container(options, container_config).await {
            Ok(resp) => resp.id,
            Err(e) => return ContainerResult::failure(RuntimeError::Create(e.to_string())),
        };
        debug!(container_id = %id, name = %config.name, "container created");

        if let Err(e) = self
            .client
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
        {
            return ContainerResult::failure(RuntimeError::Start(e.to_string()));
        }
        info!(container_id = %id, name = %config.name, "container started");

        ContainerResult::success(id, "start")
    }

    async fn stop(&self, container_id: &str) -> ContainerResult {
        debug!(%container_id, "stopping container");
        if let Err(e) = self
            .client
            .stop_container(container_id, None::<StopContainerOptions>)
            .await
        {
            return ContainerResult {
                container_id: container_id.to_string(),
                action: "stop".to_string(),
                result: String::new(),
                error: Some(RuntimeError::Stop(e.to_string())),
            };
        }
        if let Err(e) = self
            .client
            .remove_container(container_id, None::<RemoveContainerOptions>)
            .await
        {
            return ContainerResult {
                container_id: container_id.to_string(),
                action: "stop".to_string(),
                result: String::new(),
                error: Some(RuntimeError::Remove(e.to_string())),
            };
        }
        info!(%container_id, "container stopped and removed");
        ContainerResult::success(container_id.to_string(), "stop")
    }

    async fn inspect(&self, container_id: &str) -> Result<InspectResponse, RuntimeError> {
        let resp = self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404,
                    message,
                } => RuntimeError::NotFound(message),
                other => RuntimeError::Inspect(other.to_string()),
            })?;

        let status = resp
            .state
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_default();

        let mut host_ports = HashMap::new();
        if let Some(ports) = resp.network_settings.and_then(|n| n.ports) {
            for (port, maybe_bindings) in ports {
                let bound = maybe_bindings
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| HostPort {
                        host_ip: b.host_ip.unwrap_or_default(),
                        host_port: b.host_port.unwrap_or_default(),
                    })
                    .collect();
                host_ports.insert(port, bound);
            }
        }

        Ok(InspectResponse { status, host_ports })
    }
}

fn restart_policy_name(policy: RestartPolicy) -> RestartPolicyNameEnum {
    match policy {
        RestartPolicy::None => RestartPolicyNameEnum::NO,
        RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        RestartPolicy::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
        RestartPolicy::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
    }
}
