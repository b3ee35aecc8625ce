use domain::common::error::PacketFilterError;
use domain::rule::entity::Ruleset;
use domain::rule::synth::{base_rules, container_rules, custom_table_chains, network_rules};
use domain::topology::entity::{ManagedContainer, ManagedNetwork};
use ports::secondary::packet_filter::PacketFilterPort;

use crate::firewall::Firewall;

/// Drives the firewall from topology changes.
///
/// Holds the hairpin flag detected at startup and passes it into every
/// synthesizer call; the kernel is never re-probed for it.
pub struct RuleManager {
    fw: Firewall,
    hairpin: bool,
}

impl RuleManager {
    /// Bootstraps the firewall: the DOCKER-USER chain, the custom
    /// chains (cleared), and the base rules.
    pub fn new(port: Box<dyn PacketFilterPort>, hairpin: bool) -> Result<Self, PacketFilterError> {
        let mut fw = Firewall::new(port);
        fw.ensure_user_filter_chain()?;
        fw.ensure_table_chains(&custom_table_chains())?;
        fw.ensure_rules(&base_rules(hairpin))?;

        Ok(Self { fw, hairpin })
    }

    pub fn hairpin(&self) -> bool {
        self.hairpin
    }

    /// Apply the rule delta between two versions of a network.
    /// `None` stands for "absent" on either side.
    pub fn replace_network(
        &mut self,
        old: Option<&ManagedNetwork>,
        new: Option<&ManagedNetwork>,
    ) -> Result<(), PacketFilterError> {
        self.apply_rules(
            network_rules(old, self.hairpin),
            network_rules(new, self.hairpin),
        )
    }

    /// Apply the rule delta between two versions of a container.
    pub fn replace_container(
        &mut self,
        old: Option<&ManagedContainer>,
        new: Option<&ManagedContainer>,
    ) -> Result<(), PacketFilterError> {
        self.apply_rules(
            container_rules(old, self.hairpin),
            container_rules(new, self.hairpin),
        )
    }

    /// Remove base rules and custom chains. Per-network and per-container
    /// rules must already be gone.
    pub fn cleanup(&mut self) -> Result<(), PacketFilterError> {
        self.fw.remove_rules(&base_rules(self.hairpin))?;
        self.fw.remove_table_chains(&custom_table_chains());

        Ok(())
    }

    /// New rules go in before obsolete ones come out, so matching
    /// traffic never hits a gap; rules shared by both sides are kept out
    /// of the removal set by the diff.
    fn apply_rules(&mut self, old: Ruleset, new: Ruleset) -> Result<(), PacketFilterError> {
        let obsolete = old.diff(&new);

        self.fw.ensure_rules(&new)?;
        self.fw.remove_rules(&obsolete)?;

        Ok(())
    }
}
