use std::collections::HashMap;

use domain::common::error::PacketFilterError;
use domain::inventory::entity::{ContainerSnapshot, NetworkSnapshot};
use domain::mapping::entity::AddressMapping;
use domain::topology::entity::{ManagedContainer, ManagedNetwork};
use domain::topology::parser::{parse_container, parse_network};
use tracing::warn;

use crate::manager::RuleManager;

/// The reconciler's view of the world: managed networks and containers
/// by id. Updates parse the raw snapshot, hand old and new to the
/// manager, and replace the entry wholesale — entries are never mutated
/// in place.
pub struct State {
    manager: RuleManager,
    networks: HashMap<String, ManagedNetwork>,
    containers: HashMap<String, ManagedContainer>,
    mapping: AddressMapping,
}

impl State {
    pub fn new(manager: RuleManager, mapping: AddressMapping) -> Self {
        Self {
            manager,
            networks: HashMap::new(),
            containers: HashMap::new(),
            mapping,
        }
    }

    /// Add, update or remove one network. `None` (or a snapshot that does
    /// not parse to a managed network) removes it.
    pub fn update_network(
        &mut self,
        id: &str,
        raw: Option<&NetworkSnapshot>,
    ) -> Result<(), PacketFilterError> {
        let old = self.networks.get(id).cloned();
        let new = raw.and_then(parse_network);

        if old.is_some() || new.is_some() {
            self.manager.replace_network(old.as_ref(), new.as_ref())?;
        }

        match new {
            Some(network) => {
                self.networks.insert(id.to_string(), network);
            }
            None => {
                self.networks.remove(id);
            }
        }

        Ok(())
    }

    /// Add, update or remove one container, same contract as
    /// [`State::update_network`].
    pub fn update_container(
        &mut self,
        id: &str,
        raw: Option<&ContainerSnapshot>,
    ) -> Result<(), PacketFilterError> {
        let old = self.containers.get(id).cloned();
        let new = raw.and_then(|snapshot| parse_container(snapshot, &self.networks, &self.mapping));

        if old.is_some() || new.is_some() {
            self.manager.replace_container(old.as_ref(), new.as_ref())?;
        }

        match new {
            Some(container) => {
                self.containers.insert(id.to_string(), container);
            }
            None => {
                self.containers.remove(id);
            }
        }

        Ok(())
    }

    /// Remove every managed network whose id is not in `ids`.
    pub fn remove_missing_networks(&mut self, ids: &[String]) -> Result<(), PacketFilterError> {
        let stale: Vec<String> = self
            .networks
            .keys()
            .filter(|id| !ids.contains(id))
            .cloned()
            .collect();

        for id in stale {
            self.update_network(&id, None)?;
        }

        Ok(())
    }

    /// Remove every managed container whose id is not in `ids`.
    pub fn remove_missing_containers(&mut self, ids: &[String]) -> Result<(), PacketFilterError> {
        let stale: Vec<String> = self
            .containers
            .keys()
            .filter(|id| !ids.contains(id))
            .cloned()
            .collect();

        for id in stale {
            self.update_container(&id, None)?;
        }

        Ok(())
    }

    pub fn has_network(&self, id: &str) -> bool {
        self.networks.contains_key(id)
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    /// Remove everything: containers, then networks, then the manager's
    /// base rules and chains. Per-object removal failures are logged and
    /// skipped so teardown always reaches the end.
    pub fn cleanup(&mut self) -> Result<(), PacketFilterError> {
        if let Err(err) = self.remove_missing_containers(&[]) {
            warn!("failed to remove container rules during cleanup: {err}");
        }
        if let Err(err) = self.remove_missing_networks(&[]) {
            warn!("failed to remove network rules during cleanup: {err}");
        }

        self.manager.cleanup()
    }
}
