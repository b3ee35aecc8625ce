use std::process::{Command, Output};

use domain::common::error::PacketFilterError;
use domain::rule::entity::{Chain, Table};
use ports::secondary::packet_filter::PacketFilterPort;
use tracing::trace;

/// Address family served by one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Ipv4,
    Ipv6,
}

impl Family {
    fn program(self) -> &'static str {
        match self {
            Self::Ipv4 => "iptables",
            Self::Ipv6 => "ip6tables",
        }
    }
}

/// Packet-filter port backed by the iptables/ip6tables binaries.
///
/// Every call is one short-lived process: `<program> --wait -t <table>
/// <op> <chain> [args]`. `--wait` serializes against other xtables users
/// (the Docker daemon foremost) instead of failing on the lock.
pub struct NetfilterCli {
    program: &'static str,
}

impl NetfilterCli {
    pub fn new(family: Family) -> Self {
        Self {
            program: family.program(),
        }
    }

    pub fn ipv4() -> Self {
        Self::new(Family::Ipv4)
    }

    pub fn ipv6() -> Self {
        Self::new(Family::Ipv6)
    }

    fn output(&self, table: Table, args: &[String]) -> Result<Output, PacketFilterError> {
        trace!("{} --wait -t {} {}", self.program, table, args.join(" "));
        Command::new(self.program)
            .arg("--wait")
            .arg("-t")
            .arg(table.as_str())
            .args(args)
            .output()
            .map_err(|source| PacketFilterError::Spawn {
                program: self.program.to_string(),
                source,
            })
    }

    fn run(&self, table: Table, args: &[String]) -> Result<(), PacketFilterError> {
        let output = self.output(table, args)?;
        if output.status.success() {
            return Ok(());
        }

        Err(self.failure(table, args, &output))
    }

    fn failure(&self, table: Table, args: &[String], output: &Output) -> PacketFilterError {
        PacketFilterError::CommandFailed {
            program: self.program.to_string(),
            args: format!("-t {} {}", table, args.join(" ")),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Chain names from `-S` output: one `-P <chain> <policy>` line per
/// builtin chain and one `-N <chain>` line per user-defined chain,
/// followed by the rules.
fn parse_chain_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("-P" | "-N") => fields.next().map(str::to_string),
                _ => None,
            }
        })
        .collect()
}

fn chain_args(op: &str, chain: Chain, spec: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(spec.len() + 2);
    args.push(op.to_string());
    args.push(chain.as_str().to_string());
    args.extend_from_slice(spec);
    args
}

impl PacketFilterPort for NetfilterCli {
    fn new_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        self.run(table, &chain_args("-N", chain, &[]))
    }

    fn clear_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        // create-or-flush: a fresh chain is already empty
        match self.new_chain(table, chain) {
            Ok(()) => Ok(()),
            Err(PacketFilterError::CommandFailed { .. }) => {
                self.run(table, &chain_args("-F", chain, &[]))
            }
            Err(err) => Err(err),
        }
    }

    fn delete_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError> {
        self.run(table, &chain_args("-X", chain, &[]))
    }

    fn list_chains(&self, table: Table) -> Result<Vec<String>, PacketFilterError> {
        let args = vec!["-S".to_string()];
        let output = self.output(table, &args)?;
        if !output.status.success() {
            return Err(self.failure(table, &args, &output));
        }

        Ok(parse_chain_listing(&String::from_utf8_lossy(&output.stdout)))
    }

    fn exists(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<bool, PacketFilterError> {
        let args = chain_args("-C", chain, spec);
        let output = self.output(table, &args)?;
        if output.status.success() {
            return Ok(true);
        }

        // -C exits 1 when no matching rule exists
        match output.status.code() {
            Some(1) => Ok(false),
            _ => Err(self.failure(table, &args, &output)),
        }
    }

    fn insert(
        &self,
        table: Table,
        chain: Chain,
        position: usize,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        let mut args = chain_args("-I", chain, &[]);
        args.push(position.to_string());
        args.extend_from_slice(spec);
        self.run(table, &args)
    }

    fn append_unique(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        if self.exists(table, chain, spec)? {
            return Ok(());
        }

        self.run(table, &chain_args("-A", chain, spec))
    }

    fn delete(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<(), PacketFilterError> {
        self.run(table, &chain_args("-D", chain, spec))
    }
}
