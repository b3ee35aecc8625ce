use std::collections::{HashMap, HashSet};

use domain::common::error::PacketFilterError;
use domain::rule::entity::{Chain, Rule, Ruleset, Table, TableChain};
use ports::secondary::packet_filter::PacketFilterPort;
use tracing::debug;

/// Stateful wrapper over the IPv6 packet filter.
///
/// Tracks, per chain, the hashes of every rule this process installed
/// (the active index). Appended rules are inserted right after the rules
/// we already own in that chain, so foreign rules below keep their place;
/// prepended rules are driven to the top. A failing kernel call leaves
/// the index at the last successful mutation.
pub struct Firewall {
    port: Box<dyn PacketFilterPort>,
    active: HashMap<TableChain, HashSet<String>>,
    user_chain_jump: Rule,
}

impl Firewall {
    pub fn new(port: Box<dyn PacketFilterPort>) -> Self {
        Self {
            port,
            active: HashMap::new(),
            user_chain_jump: Rule::new(Table::Filter, Chain::Forward, ["-j", "DOCKER-USER"]),
        }
    }

    /// Create-or-flush every given chain and forget its index entries.
    pub fn ensure_table_chains(&mut self, chains: &[TableChain]) -> Result<(), PacketFilterError> {
        for tc in chains {
            self.port.clear_chain(tc.table, tc.chain)?;
            self.active.remove(tc);
        }

        Ok(())
    }

    /// Flush and delete every given chain. Best-effort: teardown keeps
    /// going past chains that are missing or still referenced.
    pub fn remove_table_chains(&mut self, chains: &[TableChain]) {
        for tc in chains {
            let _ = self.port.clear_chain(tc.table, tc.chain);
            let _ = self.port.delete_chain(tc.table, tc.chain);
            self.active.remove(tc);
        }
    }

    /// Make sure DOCKER-USER exists without flushing it (the operator
    /// owns its contents), ensure it falls through to RETURN, and drop
    /// Docker's own FORWARD jump so the prepended base rule controls the
    /// jump's position instead.
    pub fn ensure_user_filter_chain(&mut self) -> Result<(), PacketFilterError> {
        let chains = self.port.list_chains(Table::Filter)?;
        if !chains.iter().any(|name| name == Chain::DockerUser.as_str()) {
            self.port.new_chain(Table::Filter, Chain::DockerUser)?;
        }

        let return_spec = ["-j".to_string(), "RETURN".to_string()];
        self.port
            .append_unique(Table::Filter, Chain::DockerUser, &return_spec)?;

        if self
            .port
            .exists(Table::Filter, Chain::Forward, &self.user_chain_jump.spec)?
        {
            self.port
                .delete(Table::Filter, Chain::Forward, &self.user_chain_jump.spec)?;
        }

        Ok(())
    }

    /// Idempotently install a ruleset.
    ///
    /// Two passes: appended rules first, in emitted order, each inserted
    /// after the rules we own in its chain; then prepended rules in
    /// reverse, each at position 1, so the emitted order is the final
    /// top-to-bottom order.
    pub fn ensure_rules(&mut self, rules: &Ruleset) -> Result<(), PacketFilterError> {
        for rule in rules.iter().filter(|r| !r.prepend) {
            if !self.port.exists(rule.tc.table, rule.tc.chain, &rule.spec)? {
                let position = self.active_len(rule.tc) + 1;
                self.port
                    .insert(rule.tc.table, rule.tc.chain, position, &rule.spec)?;
                debug!(
                    "rule added: -t {} -I {} {} {}",
                    rule.tc.table,
                    rule.tc.chain,
                    position,
                    rule.spec.join(" ")
                );
            }
            self.activate(rule);
        }

        for rule in rules.iter().rev().filter(|r| r.prepend) {
            if !self.port.exists(rule.tc.table, rule.tc.chain, &rule.spec)? {
                self.port.insert(rule.tc.table, rule.tc.chain, 1, &rule.spec)?;
                debug!(
                    "rule added: -t {} -I {} 1 {}",
                    rule.tc.table,
                    rule.tc.chain,
                    rule.spec.join(" ")
                );
            }
            self.activate(rule);
        }

        Ok(())
    }

    /// Idempotently remove a ruleset. The FORWARD → DOCKER-USER jump is
    /// never removed here: the chain and its wiring outlive any single
    /// ruleset and belong to the daemon bootstrap.
    pub fn remove_rules(&mut self, rules: &Ruleset) -> Result<(), PacketFilterError> {
        for rule in rules {
            if rule.same_rule(&self.user_chain_jump) {
                continue;
            }

            if self.port.exists(rule.tc.table, rule.tc.chain, &rule.spec)? {
                self.port.delete(rule.tc.table, rule.tc.chain, &rule.spec)?;
                debug!(
                    "rule removed: -t {} -D {} {}",
                    rule.tc.table,
                    rule.tc.chain,
                    rule.spec.join(" ")
                );
            }
            self.deactivate(rule);
        }

        Ok(())
    }

    fn active_len(&self, tc: TableChain) -> usize {
        self.active.get(&tc).map_or(0, HashSet::len)
    }

    fn activate(&mut self, rule: &Rule) {
        self.active.entry(rule.tc).or_default().insert(rule.hash());
    }

    fn deactivate(&mut self, rule: &Rule) {
        if let Some(hashes) = self.active.get_mut(&rule.tc) {
            hashes.remove(&rule.hash());
        }
    }
}
