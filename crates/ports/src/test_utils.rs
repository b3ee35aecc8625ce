use std::collections::HashMap;
use std::sync::Mutex;

use domain::common::error::PacketFilterError;
use domain::rule::entity::{Chain, Table};

use crate::secondary::packet_filter::PacketFilterPort;

/// One call against the fake packet filter, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    NewChain(Table, String),
    ClearChain(Table, String),
    DeleteChain(Table, String),
    ListChains(Table),
    Exists(Table, String, Vec<String>),
    Insert(Table, String, usize, Vec<String>),
    Append(Table, String, Vec<String>),
    Delete(Table, String, Vec<String>),
}

#[derive(Default)]
struct KernelState {
    chains: HashMap<(Table, String), Vec<Vec<String>>>,
    ops: Vec<FilterOp>,
}

/// In-memory packet filter that records every call.
///
/// Behaves like the real CLI where it matters for callers: `new_chain`
/// fails on an existing chain, `delete_chain` fails on a missing or
/// non-empty one, `delete` fails on an absent rule, and `exists` is
/// token-exact. Builtin chains are pre-seeded in both tables.
pub struct RecordingPacketFilter {
    inner: Mutex<KernelState>,
}

impl Default for RecordingPacketFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPacketFilter {
    pub fn new() -> Self {
        let mut chains = HashMap::new();
        for chain in [Chain::Input, Chain::Forward, Chain::Output] {
            chains.insert((Table::Filter, chain.as_str().to_string()), Vec::new());
        }
        for chain in [
            Chain::Prerouting,
            Chain::Input,
            Chain::Output,
            Chain::Postrouting,
        ] {
            chains.insert((Table::Nat, chain.as_str().to_string()), Vec::new());
        }

        Self {
            inner: Mutex::new(KernelState {
                chains,
                ops: Vec::new(),
            }),
        }
    }

    /// Plant a pre-existing rule, e.g. Docker's own IPv4 rules for
    /// hairpin-detection tests.
    pub fn seed_rule(&self, table: Table, chain: &str, spec: &[&str]) {
        let mut state = self.inner.lock().unwrap();
        state
            .chains
            .entry((table, chain.to_string()))
            .or_default()
            .push(spec.iter().map(|s| (*s).to_string()).collect());
    }

    pub fn ops(&self) -> Vec<FilterOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Forget recorded calls, keeping kernel state. Lets a test separate
    /// the setup phase from the assertions.
    pub fn clear_ops(&self) {
        self.inner.lock().unwrap().ops.clear();
    }

    pub fn insert_count(&self) -> usize {
        self.count(|op| matches!(op, FilterOp::Insert(..)))
    }

    pub fn delete_count(&self) -> usize {
        self.count(|op| matches!(op, FilterOp::Delete(..)))
    }

    pub fn exists_count(&self) -> usize {
        self.count(|op| matches!(op, FilterOp::Exists(..)))
    }

    pub fn chain_exists(&self, table: Table, chain: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .chains
            .contains_key(&(table, chain.to_string()))
    }

    /// Rules of one chain, top to bottom.
    pub fn rules(&self, table: Table, chain: Chain) -> Vec<Vec<String>> {
        self.inner
            .lock()
            .unwrap()
            .chains
            .get(&(table, chain.as_str().to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_rule(&self, table: Table, chain: Chain, spec: &[&str]) -> bool {
        let spec: Vec<String> = spec.iter().map(|s| (*s).to_string()).collect();
        self.rules(table, chain).contains(&spec)
    }

    /// Total number of rules across both tables.
    pub fn total_rules(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .chains
            .values()
            .map(Vec::len)
            .sum()
    }

    fn count(&self, pred: impl Fn(&FilterOp) -> bool) -> usize {
        self.inner.lock().unwrap().ops.iter().filter(|op| pred(op)).count()
    }

    fn failure(args: String) -> PacketFilterError {
        PacketFilterError::CommandFailed {
            program: "packet-filter-fake".to_string(),
            args,
            status: "exit status: 1".to_string(),
            stderr: String::new(),
        }
    }
}

/// Delegation so a test can keep a handle for assertions while the code
/// under test owns the port.
impl PacketFilterPort for std::sync::Arc<RecordingPacketFilter> {
    fn new_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        (**self).new_chain(table, chain)
    }

    fn clear_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        (**self).clear_chain(table, chain)
    }

    fn delete_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        (**self).delete_chain(table, chain)
    }

    fn list_chains(&self, table: Table) -> Result<Vec<String>, PacketFilterError> {
        (**self).list_chains(table)
    }

    fn exists(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<bool, PacketFilterError> {
        (**self).exists(table, chain, spec)
    }

    fn insert(
        &self,
        table: Table,
        chain: Chain,
        position: usize,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        (**self).insert(table, chain, position, spec)
    }

    fn append_unique(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        (**self).append_unique(table, chain, spec)
    }

    fn delete(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        (**self).delete(table, chain, spec)
    }
}

impl PacketFilterPort for RecordingPacketFilter {
    fn new_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        let key = (table, chain.as_str().to_string());
        state
            .ops
            .push(FilterOp::NewChain(table, chain.as_str().to_string()));
        if state.chains.contains_key(&key) {
            return Err(Self::failure(format!("-t {table} -N {chain}: exists")));
        }
        state.chains.insert(key, Vec::new());
        Ok(())
    }

    fn clear_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        state
            .ops
            .push(FilterOp::ClearChain(table, chain.as_str().to_string()));
        state
            .chains
            .insert((table, chain.as_str().to_string()), Vec::new());
        Ok(())
    }

    fn delete_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        let key = (table, chain.as_str().to_string());
        state
            .ops
            .push(FilterOp::DeleteChain(table, chain.as_str().to_string()));
        match state.chains.get(&key).map(Vec::len) {
            None => Err(Self::failure(format!("-t {table} -X {chain}: no such chain"))),
            Some(len) if len > 0 => {
                Err(Self::failure(format!("-t {table} -X {chain}: not empty")))
            }
            Some(_) => {
                state.chains.remove(&key);
                Ok(())
            }
        }
    }

    fn list_chains(&self, table: Table) -> Result<Vec<String>, PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        state.ops.push(FilterOp::ListChains(table));
        let mut names: Vec<String> = state
            .chains
            .keys()
            .filter(|(t, _)| *t == table)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn exists(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<bool, PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        state.ops.push(FilterOp::Exists(
            table,
            chain.as_str().to_string(),
            spec.to_vec(),
        ));
        Ok(state
            .chains
            .get(&(table, chain.as_str().to_string()))
            .is_some_and(|rules| rules.iter().any(|r| r == spec)))
    }

    fn insert(
        &self,
        table: Table,
        chain: Chain,
        position: usize,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        state.ops.push(FilterOp::Insert(
            table,
            chain.as_str().to_string(),
            position,
            spec.to_vec(),
        ));
        let rules = state
            .chains
            .get_mut(&(table, chain.as_str().to_string()))
            .ok_or_else(|| Self::failure(format!("-t {table} -I {chain}: no such chain")))?;
        if position == 0 || position > rules.len() + 1 {
            return Err(Self::failure(format!(
                "-t {table} -I {chain} {position}: index out of range"
            )));
        }
        rules.insert(position - 1, spec.to_vec());
        Ok(())
    }

    fn append_unique(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        state.ops.push(FilterOp::Append(
            table,
            chain.as_str().to_string(),
            spec.to_vec(),
        ));
        let rules = state
            .chains
            .get_mut(&(table, chain.as_str().to_string()))
            .ok_or_else(|| Self::failure(format!("-t {table} -A {chain}: no such chain")))?;
        if !rules.iter().any(|r| r == spec) {
            rules.push(spec.to_vec());
        }
        Ok(())
    }

    fn delete(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        let mut state = self.inner.lock().unwrap();
        state.ops.push(FilterOp::Delete(
            table,
            chain.as_str().to_string(),
            spec.to_vec(),
        ));
        let rules = state
            .chains
            .get_mut(&(table, chain.as_str().to_string()))
            .ok_or_else(|| Self::failure(format!("-t {table} -D {chain}: no such chain")))?;
        let position = rules
            .iter()
            .position(|r| r == spec)
            .ok_or_else(|| Self::failure(format!("-t {table} -D {chain}: no matching rule")))?;
        rules.remove(position);
        Ok(())
    }
}
