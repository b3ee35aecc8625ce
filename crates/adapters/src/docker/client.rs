use std::env;

use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, EventMessage, EventMessageTypeEnum, Network};
use bollard::network::{InspectNetworkOptions, ListNetworksOptions};
use bollard::system::EventsOptions;
use domain::common::error::RuntimeError;
use domain::inventory::entity::{
    AttachedNetwork, ContainerSnapshot, EventKind, NetworkSnapshot, PortBindingSnapshot,
    RuntimeEvent,
};
use futures_util::StreamExt;
use ports::secondary::runtime::RuntimePort;
use tokio::sync::mpsc;
use tracing::warn;

/// Runtime port backed by the Docker Engine API via bollard.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    event_capacity: usize,
}

impl DockerRuntime {
    /// Connect using the standard environment: `DOCKER_HOST` for the
    /// endpoint, `DOCKER_TLS_VERIFY` + `DOCKER_CERT_PATH` for TLS, the
    /// local socket otherwise.
    pub fn connect_from_env(event_capacity: usize) -> Result<Self, RuntimeError> {
        let tls = env::var("DOCKER_TLS_VERIFY").is_ok_and(|value| !value.is_empty());
        let host = env::var("DOCKER_HOST").unwrap_or_default();

        let docker = if tls {
            Docker::connect_with_ssl_defaults()
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http_defaults()
        } else {
            Docker::connect_with_local_defaults()
        }
        .map_err(|err| RuntimeError::Connection(err.to_string()))?;

        Ok(Self {
            docker,
            event_capacity,
        })
    }

    fn api_error(err: BollardError) -> RuntimeError {
        RuntimeError::Api(err.to_string())
    }

    fn is_not_found(err: &BollardError) -> bool {
        matches!(
            err,
            BollardError::DockerResponseServerError {
                status_code: 404,
                ..
            }
        )
    }
}

impl RuntimePort for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|err| RuntimeError::Connection(err.to_string()))
    }

    async fn list_networks(&self) -> Result<Vec<NetworkSnapshot>, RuntimeError> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(Self::api_error)?;

        Ok(networks.into_iter().map(network_snapshot).collect())
    }

    async fn network_info(&self, id: &str) -> Result<Option<NetworkSnapshot>, RuntimeError> {
        match self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(network) => Ok(Some(network_snapshot(network))),
            Err(err) if Self::is_not_found(&err) => Ok(None),
            Err(err) => Err(Self::api_error(err)),
        }
    }

    async fn list_containers(&self) -> Result<Vec<String>, RuntimeError> {
        let containers = self
            .docker
            .list_containers(None::<ListContainersOptions<String>>)
            .await
            .map_err(Self::api_error)?;

        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> Result<Option<ContainerSnapshot>, RuntimeError> {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(container) => Ok(Some(container_snapshot(container))),
            Err(err) if Self::is_not_found(&err) => Ok(None),
            Err(err) => Err(Self::api_error(err)),
        }
    }

    fn subscribe_events(&self) -> mpsc::Receiver<RuntimeEvent> {
        let (tx, rx) = mpsc::channel(self.event_capacity);
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let mut stream = docker.events(None::<EventsOptions<String>>);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(message) => {
                        if tx.send(runtime_event(message)).await.is_err() {
                            // receiver gone: the listener was torn down
                            return;
                        }
                    }
                    Err(err) => {
                        warn!("docker event stream failed: {err}");
                        // dropping the sender closes the channel, which the
                        // consumer reads as a connection interruption
                        return;
                    }
                }
            }
        });

        rx
    }
}

fn network_snapshot(network: Network) -> NetworkSnapshot {
    let subnets = network
        .ipam
        .and_then(|ipam| ipam.config)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|config| config.subnet)
        .collect();

    NetworkSnapshot {
        id: network.id.unwrap_or_default(),
        driver: network.driver.unwrap_or_default(),
        internal: network.internal.unwrap_or(false),
        subnets,
        options: network.options.unwrap_or_default(),
    }
}

fn container_snapshot(container: ContainerInspectResponse) -> ContainerSnapshot {
    // Endpoint and binding maps are hash maps on the wire; sort both so
    // repeated inspects of an unchanged container parse identically.
    let mut networks: Vec<AttachedNetwork> = container
        .network_settings
        .and_then(|settings| settings.networks)
        .unwrap_or_default()
        .into_values()
        .filter_map(|endpoint| {
            Some(AttachedNetwork {
                network_id: endpoint.network_id?,
                global_ipv6: endpoint.global_ipv6_address.unwrap_or_default(),
            })
        })
        .collect();
    networks.sort_by(|a, b| a.network_id.cmp(&b.network_id));

    let mut bindings: Vec<(String, Vec<bollard::models::PortBinding>)> = container
        .host_config
        .and_then(|config| config.port_bindings)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(port, bindings)| Some((port, bindings?)))
        .collect();
    bindings.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ports = Vec::new();
    for (port_and_proto, port_bindings) in bindings {
        let (port, proto) = match port_and_proto.split_once('/') {
            Some((port, proto)) => (port.to_string(), proto.to_string()),
            None => (port_and_proto, "tcp".to_string()),
        };

        for binding in port_bindings {
            ports.push(PortBindingSnapshot {
                container_port: port.clone(),
                proto: proto.clone(),
                host_ip: binding.host_ip.unwrap_or_default(),
                host_port: binding.host_port.unwrap_or_default(),
            });
        }
    }

    ContainerSnapshot {
        id: container.id.unwrap_or_default(),
        networks,
        ports,
    }
}

fn runtime_event(message: EventMessage) -> RuntimeEvent {
    let kind = match message.typ {
        Some(EventMessageTypeEnum::NETWORK) => EventKind::Network,
        Some(EventMessageTypeEnum::CONTAINER) => EventKind::Container,
        _ => EventKind::Other,
    };

    let actor = message.actor.unwrap_or_default();

    RuntimeEvent {
        kind,
        action: message.action.unwrap_or_default(),
        actor_id: actor.id.unwrap_or_default(),
        attributes: actor.attributes.unwrap_or_default(),
    }
}
