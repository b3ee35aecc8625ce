//! Pure translation from managed topology to ordered rulesets.
//!
//! Everything here is a function of its arguments; the hairpin flag is
//! detected once at startup and passed by value into every call.

use crate::topology::entity::{ManagedContainer, ManagedNetwork, ManagedPort};

use super::entity::{Chain, Rule, Ruleset, Table, TableChain};

/// The chains this daemon creates and owns (DOCKER-USER is bootstrapped
/// separately because Docker may own it too).
pub fn custom_table_chains() -> Vec<TableChain> {
    vec![
        TableChain::new(Table::Filter, Chain::Docker),
        TableChain::new(Table::Filter, Chain::DockerIsolationStage1),
        TableChain::new(Table::Filter, Chain::DockerIsolationStage2),
        TableChain::new(Table::Nat, Chain::Docker),
    ]
}

/// Topology-independent rules wiring the custom chains into the builtin
/// ones. The two FORWARD jumps are prepended so their position survives
/// a Docker daemon restart re-adding its own jumps.
pub fn base_rules(hairpin: bool) -> Ruleset {
    let mut output_spec = vec!["-m", "addrtype", "--dst-type", "LOCAL", "-j", "DOCKER"];
    if !hairpin {
        output_spec.extend(["!", "-d", "::1"]);
    }

    vec![
        Rule::prepended(Table::Filter, Chain::Forward, ["-j", "DOCKER-USER"]),
        Rule::prepended(
            Table::Filter,
            Chain::Forward,
            ["-j", "DOCKER-ISOLATION-STAGE-1"],
        ),
        Rule::new(Table::Filter, Chain::DockerIsolationStage1, ["-j", "RETURN"]),
        Rule::new(Table::Filter, Chain::DockerIsolationStage2, ["-j", "RETURN"]),
        Rule::new(
            Table::Nat,
            Chain::Prerouting,
            ["-m", "addrtype", "--dst-type", "LOCAL", "-j", "DOCKER"],
        ),
        Rule::new(Table::Nat, Chain::Output, output_spec),
    ]
    .into()
}

/// Isolation, forwarding and masquerade rules for one network.
pub fn network_rules(network: Option<&ManagedNetwork>, hairpin: bool) -> Ruleset {
    let Some(network) = network else {
        return Ruleset::new();
    };

    let bridge = network.bridge.as_str();
    let icc_action = if network.icc { "ACCEPT" } else { "DROP" };

    if network.internal {
        // Unlike the IPv4 counterpart these match on the bridge, not the
        // subnet, so NDP multicast inside the bridge is not caught.
        return vec![
            Rule::prepended(
                Table::Filter,
                Chain::DockerIsolationStage1,
                ["!", "-i", bridge, "-o", bridge, "-j", "DROP"],
            ),
            Rule::prepended(
                Table::Filter,
                Chain::DockerIsolationStage1,
                ["!", "-o", bridge, "-i", bridge, "-j", "DROP"],
            ),
            Rule::new(
                Table::Filter,
                Chain::Forward,
                ["-i", bridge, "-o", bridge, "-j", icc_action],
            ),
        ]
        .into();
    }

    let mut rules: Ruleset = vec![
        // traffic leaving this network is judged by stage 2
        Rule::prepended(
            Table::Filter,
            Chain::DockerIsolationStage1,
            ["-i", bridge, "!", "-o", bridge, "-j", "DOCKER-ISOLATION-STAGE-2"],
        ),
        // traffic from another docker network may not enter this one
        Rule::prepended(
            Table::Filter,
            Chain::DockerIsolationStage2,
            ["-o", bridge, "-j", "DROP"],
        ),
        // new inbound connections are judged by the DOCKER chain
        Rule::new(Table::Filter, Chain::Forward, ["-o", bridge, "-j", "DOCKER"]),
        Rule::new(
            Table::Filter,
            Chain::Forward,
            [
                "-o", bridge, "-m", "conntrack", "--ctstate", "RELATED,ESTABLISHED", "-j",
                "ACCEPT",
            ],
        ),
        Rule::new(
            Table::Filter,
            Chain::Forward,
            ["-i", bridge, "!", "-o", bridge, "-j", "ACCEPT"],
        ),
        Rule::new(
            Table::Filter,
            Chain::Forward,
            ["-i", bridge, "-o", bridge, "-j", icc_action],
        ),
        Rule::prepended(
            Table::Nat,
            Chain::Postrouting,
            [
                "-o", bridge, "-m", "addrtype", "--dst-type", "LOCAL", "-j", "MASQUERADE",
            ],
        ),
    ]
    .into();

    if network.masquerade {
        let subnet = network.subnet.to_string();
        rules.push(Rule::prepended(
            Table::Nat,
            Chain::Postrouting,
            ["-s", subnet.as_str(), "!", "-o", bridge, "-j", "MASQUERADE"],
        ));
    }

    if !hairpin {
        rules.push(Rule::prepended(
            Table::Nat,
            Chain::Docker,
            ["-i", bridge, "-j", "RETURN"],
        ));
    }

    rules
}

/// All per-port rules of one container, in port order.
pub fn container_rules(container: Option<&ManagedContainer>, hairpin: bool) -> Ruleset {
    let Some(container) = container else {
        return Ruleset::new();
    };

    let mut rules = Ruleset::with_capacity(container.ports.len() * 3);
    for port in &container.ports {
        rules.extend(port_rules(port, container, hairpin));
    }

    rules
}

/// Exactly three rules per published port: forward-accept, hairpin
/// masquerade, and the DNAT itself.
pub fn port_rules(port: &ManagedPort, container: &ManagedContainer, hairpin: bool) -> Ruleset {
    let address = container.address.to_string();
    let bridge = container.bridge.as_str();
    let proto = port.proto.as_str();
    let container_port = port.port.to_string();
    let host_port = port.host_port.to_string();

    let host_address = if port.host_address.is_unspecified() {
        "0/0".to_string()
    } else {
        port.host_address.to_string()
    };

    let mut dnat_spec = vec![
        "-d".to_string(),
        host_address,
        "-p".to_string(),
        proto.to_string(),
        "-m".to_string(),
        proto.to_string(),
        "--dport".to_string(),
        host_port,
        "-j".to_string(),
        "DNAT".to_string(),
        "--to-destination".to_string(),
        format!("[{}]:{}", address, container_port),
    ];
    if !hairpin {
        dnat_spec.extend(["!".to_string(), "-i".to_string(), bridge.to_string()]);
    }

    vec![
        Rule::new(
            Table::Filter,
            Chain::Docker,
            [
                "-d",
                address.as_str(),
                "!",
                "-i",
                bridge,
                "-o",
                bridge,
                "-p",
                proto,
                "-m",
                proto,
                "--dport",
                container_port.as_str(),
                "-j",
                "ACCEPT",
            ],
        ),
        Rule::new(
            Table::Nat,
            Chain::Postrouting,
            [
                "-s",
                address.as_str(),
                "-d",
                address.as_str(),
                "-p",
                proto,
                "-m",
                proto,
                "--dport",
                container_port.as_str(),
                "-j",
                "MASQUERADE",
            ],
        ),
        Rule::new(Table::Nat, Chain::Docker, dnat_spec),
    ]
    .into()
}
