//! The event loop: one task multiplexing the Docker event stream, a
//! periodic ping, and process signals, feeding every change into state.

use std::fmt::Display;

use application::state::State;
use domain::inventory::entity::{EventKind, RuntimeEvent};
use infrastructure::constants::RETRY_INTERVAL;
use ports::secondary::runtime::RuntimePort;
use thiserror::Error;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Failure classification driving the recovery policy.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Rooted in daemon connectivity or an event-driven operation. With
    /// `--retry` the watcher logs it, tears the listener down and
    /// reconnects; a fresh reconcile repairs whatever was missed.
    #[error("{0}")]
    Recoverable(String),

    /// Everything else, kernel packet-filter failures foremost.
    /// Surfaces to process exit.
    #[error("{0}")]
    Fatal(String),
}

fn recoverable(err: impl Display) -> WatchError {
    WatchError::Recoverable(err.to_string())
}

fn fatal(err: impl Display) -> WatchError {
    WatchError::Fatal(err.to_string())
}

// ── Signals ─────────────────────────────────────────────────────────

enum Sig {
    /// SIGHUP: force a full resync.
    Resync,
    /// SIGINT, SIGTERM or SIGQUIT: exit cleanly.
    Terminate,
}

struct Signals {
    hangup: Signal,
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn recv(&mut self) -> Sig {
        tokio::select! {
            _ = self.hangup.recv() => Sig::Resync,
            _ = self.interrupt.recv() => Sig::Terminate,
            _ = self.terminate.recv() => Sig::Terminate,
            _ = self.quit.recv() => Sig::Terminate,
        }
    }
}

// ── Watcher ─────────────────────────────────────────────────────────

/// Keeps state in sync with the runtime until a termination signal or
/// an unrecoverable error.
pub struct Watcher<R: RuntimePort> {
    client: R,
    state: State,
    retry: bool,
}

impl<R: RuntimePort> Watcher<R> {
    pub fn new(client: R, state: State, retry: bool) -> Self {
        Self {
            client,
            state,
            retry,
        }
    }

    /// Access after the loop has finished, for `--cleanup`.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Run the loop. Returns `Ok` on a termination signal; errors only
    /// when recovery is impossible or disabled.
    pub async fn watch(&mut self) -> Result<(), WatchError> {
        let mut signals = Signals::install()
            .map_err(|err| fatal(format!("failed to install signal handlers: {err}")))?;
        let mut events: Option<mpsc::Receiver<RuntimeEvent>> = None;

        loop {
            if events.is_none() {
                match self.setup_listener().await {
                    Ok(rx) => events = Some(rx),
                    Err(err) => {
                        self.recover(&mut events, err)?;
                        if self.wait_before_retry(&mut signals).await {
                            return Ok(());
                        }
                        continue;
                    }
                }
            }

            let Some(rx) = events.as_mut() else {
                continue;
            };
            match self.process_once(rx, &mut signals).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(err) => self.recover(&mut events, err)?,
            }
        }
    }

    /// Ping, open the event stream, then rebuild state from a full
    /// inventory. Events arriving during the reconcile queue up in the
    /// channel and are replayed against the fresh state.
    async fn setup_listener(&mut self) -> Result<mpsc::Receiver<RuntimeEvent>, WatchError> {
        self.client.ping().await.map_err(recoverable)?;

        let events = self.client.subscribe_events();
        self.regenerate().await?;

        Ok(events)
    }

    async fn regenerate(&mut self) -> Result<(), WatchError> {
        let networks = self.client.list_networks().await.map_err(recoverable)?;
        let mut network_ids = Vec::with_capacity(networks.len());
        for network in &networks {
            network_ids.push(network.id.clone());
            self.state
                .update_network(&network.id, Some(network))
                .map_err(fatal)?;
        }

        let container_ids = self.client.list_containers().await.map_err(recoverable)?;
        for id in &container_ids {
            // a container may exit between the listing and the inspect;
            // None then removes any rules it had
            let container = self
                .client
                .inspect_container(id)
                .await
                .map_err(recoverable)?;
            self.state
                .update_container(id, container.as_ref())
                .map_err(fatal)?;
        }

        self.state
            .remove_missing_containers(&container_ids)
            .map_err(fatal)?;
        self.state
            .remove_missing_networks(&network_ids)
            .map_err(fatal)?;

        info!(
            networks = network_ids.len(),
            containers = container_ids.len(),
            "reconciled Docker inventory"
        );

        Ok(())
    }

    /// One blocking wait on the three event sources.
    /// `Ok(true)` means a clean exit was requested.
    async fn process_once(
        &mut self,
        events: &mut mpsc::Receiver<RuntimeEvent>,
        signals: &mut Signals,
    ) -> Result<bool, WatchError> {
        tokio::select! {
            () = tokio::time::sleep(RETRY_INTERVAL) => {
                self.client.ping().await.map_err(recoverable)?;
            }
            event = events.recv() => match event {
                None => {
                    return Err(WatchError::Recoverable(
                        "docker daemon connection interrupted".to_string(),
                    ));
                }
                Some(event) => {
                    // wrap everything so a failed event forces a resync
                    self.handle_event(&event).await.map_err(recoverable)?;
                }
            },
            sig = signals.recv() => match sig {
                Sig::Resync => {
                    return Err(WatchError::Recoverable("received SIGHUP".to_string()));
                }
                Sig::Terminate => return Ok(true),
            },
        }

        Ok(false)
    }

    async fn handle_event(&mut self, event: &RuntimeEvent) -> Result<(), WatchError> {
        if event.kind != EventKind::Network {
            return Ok(());
        }

        let network_id = event.actor_id.as_str();
        match event.action.as_str() {
            "create" => {
                let network = self
                    .client
                    .network_info(network_id)
                    .await
                    .map_err(recoverable)?;
                self.state
                    .update_network(network_id, network.as_ref())
                    .map_err(fatal)?;
            }
            "destroy" => {
                self.state.update_network(network_id, None).map_err(fatal)?;
            }
            "connect" | "disconnect" => {
                let Some(container_id) = event.attributes.get("container") else {
                    return Ok(());
                };
                let container = self
                    .client
                    .inspect_container(container_id)
                    .await
                    .map_err(recoverable)?;
                self.state
                    .update_container(container_id, container.as_ref())
                    .map_err(fatal)?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Recoverable + `--retry`: tear the listener down, log, carry on.
    /// Anything else propagates to the caller.
    fn recover(
        &mut self,
        events: &mut Option<mpsc::Receiver<RuntimeEvent>>,
        err: WatchError,
    ) -> Result<(), WatchError> {
        match err {
            WatchError::Recoverable(message) if self.retry => {
                *events = None;
                warn!("{message}");
                Ok(())
            }
            err => Err(err),
        }
    }

    /// Sit out the retry interval while still honoring exit signals.
    /// Returns true when a clean exit was requested.
    async fn wait_before_retry(&mut self, signals: &mut Signals) -> bool {
        tokio::select! {
            () = tokio::time::sleep(RETRY_INTERVAL) => false,
            sig = signals.recv() => match sig {
                // already disconnected; the pending reconnect resyncs anyway
                Sig::Resync => false,
                Sig::Terminate => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use application::manager::RuleManager;
    use domain::common::error::RuntimeError;
    use domain::inventory::entity::{
        AttachedNetwork, ContainerSnapshot, NetworkSnapshot, PortBindingSnapshot,
    };
    use domain::mapping::entity::AddressMapping;
    use domain::rule::entity::{Chain, Table};
    use ports::test_utils::RecordingPacketFilter;

    use super::*;

    const NETWORK_ID: &str = "deadbeef0000deadbeef0000deadbeef";
    const CONTAINER_ID: &str = "cafe000000000000";

    #[derive(Default)]
    struct FakeRuntime {
        networks: Vec<NetworkSnapshot>,
        containers: Vec<ContainerSnapshot>,
        fail_ping: bool,
        event_tx: Mutex<Option<mpsc::Sender<RuntimeEvent>>>,
    }

    impl RuntimePort for FakeRuntime {
        async fn ping(&self) -> Result<(), RuntimeError> {
            if self.fail_ping {
                return Err(RuntimeError::Connection("connection refused".to_string()));
            }
            Ok(())
        }

        async fn list_networks(&self) -> Result<Vec<NetworkSnapshot>, RuntimeError> {
            Ok(self.networks.clone())
        }

        async fn network_info(&self, id: &str) -> Result<Option<NetworkSnapshot>, RuntimeError> {
            Ok(self.networks.iter().find(|n| n.id == id).cloned())
        }

        async fn list_containers(&self) -> Result<Vec<String>, RuntimeError> {
            Ok(self.containers.iter().map(|c| c.id.clone()).collect())
        }

        async fn inspect_container(
            &self,
            id: &str,
        ) -> Result<Option<ContainerSnapshot>, RuntimeError> {
            Ok(self.containers.iter().find(|c| c.id == id).cloned())
        }

        fn subscribe_events(&self) -> mpsc::Receiver<RuntimeEvent> {
            let (tx, rx) = mpsc::channel(8);
            *self.event_tx.lock().unwrap() = Some(tx);
            rx
        }
    }

    fn network_snapshot() -> NetworkSnapshot {
        NetworkSnapshot {
            id: NETWORK_ID.to_string(),
            driver: "bridge".to_string(),
            internal: false,
            subnets: vec!["fd00::/64".to_string()],
            options: HashMap::new(),
        }
    }

    fn container_snapshot() -> ContainerSnapshot {
        ContainerSnapshot {
            id: CONTAINER_ID.to_string(),
            networks: vec![AttachedNetwork {
                network_id: NETWORK_ID.to_string(),
                global_ipv6: "fd00::2".to_string(),
            }],
            ports: vec![PortBindingSnapshot {
                container_port: "80".to_string(),
                proto: "tcp".to_string(),
                host_ip: String::new(),
                host_port: "8080".to_string(),
            }],
        }
    }

    fn watcher(
        runtime: FakeRuntime,
        retry: bool,
    ) -> (Arc<RecordingPacketFilter>, Watcher<FakeRuntime>) {
        let fake = Arc::new(RecordingPacketFilter::new());
        let manager = RuleManager::new(Box::new(Arc::clone(&fake)), false).unwrap();
        let state = State::new(manager, AddressMapping::default());
        (fake, Watcher::new(runtime, state, retry))
    }

    #[tokio::test]
    async fn setup_listener_reconciles_the_inventory() {
        let runtime = FakeRuntime {
            networks: vec![network_snapshot()],
            containers: vec![container_snapshot()],
            ..Default::default()
        };
        let (fake, mut watcher) = watcher(runtime, false);

        let _events = watcher.setup_listener().await.unwrap();

        assert!(watcher.state.has_network(NETWORK_ID));
        assert!(watcher.state.has_container(CONTAINER_ID));
        assert!(!fake.rules(Table::Nat, Chain::Docker).is_empty());
    }

    #[tokio::test]
    async fn failed_ping_is_recoverable() {
        let runtime = FakeRuntime {
            fail_ping: true,
            ..Default::default()
        };
        let (_fake, mut watcher) = watcher(runtime, false);

        let err = watcher.setup_listener().await.unwrap_err();
        assert!(matches!(err, WatchError::Recoverable(_)));
    }

    #[tokio::test]
    async fn destroy_event_removes_the_network() {
        let runtime = FakeRuntime {
            networks: vec![network_snapshot()],
            ..Default::default()
        };
        let (_fake, mut watcher) = watcher(runtime, false);
        let _events = watcher.setup_listener().await.unwrap();

        let event = RuntimeEvent {
            kind: EventKind::Network,
            action: "destroy".to_string(),
            actor_id: NETWORK_ID.to_string(),
            attributes: HashMap::new(),
        };
        watcher.handle_event(&event).await.unwrap();

        assert!(!watcher.state.has_network(NETWORK_ID));
    }

    #[tokio::test]
    async fn disconnect_event_drops_a_vanished_container() {
        let runtime = FakeRuntime {
            networks: vec![network_snapshot()],
            containers: vec![container_snapshot()],
            ..Default::default()
        };
        let (fake, mut watcher) = watcher(runtime, false);
        let _events = watcher.setup_listener().await.unwrap();

        // the container is gone by the time we inspect it
        watcher.client.containers.clear();
        let event = RuntimeEvent {
            kind: EventKind::Network,
            action: "disconnect".to_string(),
            actor_id: NETWORK_ID.to_string(),
            attributes: HashMap::from([("container".to_string(), CONTAINER_ID.to_string())]),
        };

        fake.clear_ops();
        watcher.handle_event(&event).await.unwrap();

        assert!(!watcher.state.has_container(CONTAINER_ID));
        assert_eq!(fake.delete_count(), 3);
    }

    #[tokio::test]
    async fn non_network_events_are_ignored() {
        let (fake, mut watcher) = watcher(FakeRuntime::default(), false);
        fake.clear_ops();

        let event = RuntimeEvent {
            kind: EventKind::Container,
            action: "create".to_string(),
            actor_id: CONTAINER_ID.to_string(),
            attributes: HashMap::new(),
        };
        watcher.handle_event(&event).await.unwrap();

        assert!(fake.ops().is_empty());
    }

    #[tokio::test]
    async fn recover_with_retry_swallows_recoverable_errors() {
        let (_fake, mut watcher) = watcher(FakeRuntime::default(), true);
        let mut events = Some(watcher.client.subscribe_events());

        let result = watcher.recover(
            &mut events,
            WatchError::Recoverable("connection lost".to_string()),
        );

        assert!(result.is_ok());
        assert!(events.is_none(), "the listener must be torn down");
    }

    #[tokio::test]
    async fn recover_without_retry_propagates() {
        let (_fake, mut watcher) = watcher(FakeRuntime::default(), false);
        let mut events = None;

        let result = watcher.recover(
            &mut events,
            WatchError::Recoverable("connection lost".to_string()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn recover_never_swallows_fatal_errors() {
        let (_fake, mut watcher) = watcher(FakeRuntime::default(), true);
        let mut events = None;

        let result = watcher.recover(&mut events, WatchError::Fatal("ip6tables broke".to_string()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn closed_event_channel_is_a_connection_interruption() {
        let (_fake, mut watcher) = watcher(FakeRuntime::default(), false);
        let mut events = watcher.client.subscribe_events();
        watcher.client.event_tx.lock().unwrap().take();

        let mut signals = Signals::install().unwrap();
        let err = watcher.process_once(&mut events, &mut signals).await.unwrap_err();
        assert!(matches!(err, WatchError::Recoverable(message) if message.contains("interrupted")));
    }

    #[tokio::test]
    async fn network_event_replays_into_state() {
        let runtime = FakeRuntime {
            networks: vec![network_snapshot()],
            ..Default::default()
        };
        let (_fake, mut watcher) = watcher(runtime, false);

        let event = RuntimeEvent {
            kind: EventKind::Network,
            action: "create".to_string(),
            actor_id: NETWORK_ID.to_string(),
            attributes: HashMap::new(),
        };
        watcher.handle_event(&event).await.unwrap();

        assert!(watcher.state.has_network(NETWORK_ID));
    }
}
