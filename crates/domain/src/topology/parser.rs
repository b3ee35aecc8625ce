//! Parsing of runtime snapshots into managed topology.
//!
//! Anything that does not belong to a ULA-subnetted bridge network is
//! filtered out here, so the rest of the system only ever sees objects
//! it manages. Malformed option values are logged and fall back to
//! their defaults; they never fail an update.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::Ipv6Net;
use tracing::info;

use crate::inventory::entity::{ContainerSnapshot, NetworkSnapshot};
use crate::mapping::entity::AddressMapping;

use super::entity::{is_ula, ManagedContainer, ManagedNetwork, ManagedPort, Protocol};

const OPT_BRIDGE_NAME: &str = "com.docker.network.bridge.name";
const OPT_ENABLE_ICC: &str = "com.docker.network.bridge.enable_icc";
const OPT_ENABLE_MASQUERADE: &str = "com.docker.network.bridge.enable_ip_masquerade";
const OPT_HOST_BINDING_IPV6: &str = "com.docker.network.bridge.host_binding_ipv6";

/// Parse a network snapshot into a managed network.
///
/// Returns `None` for non-bridge drivers and for networks without a ULA
/// subnet. The runtime's `EnableIPv6` flag is deliberately not consulted:
/// older daemons report it as false even with IPv6 subnets configured.
pub fn parse_network(raw: &NetworkSnapshot) -> Option<ManagedNetwork> {
    if raw.driver != "bridge" {
        return None;
    }

    let subnet = raw.subnets.iter().find_map(|s| {
        let net = s.parse::<Ipv6Net>().ok()?.trunc();
        is_ula(net.network()).then_some(net)
    })?;

    let short_id = raw.id.get(..12).unwrap_or(raw.id.as_str());
    let mut network = ManagedNetwork {
        id: raw.id.clone(),
        bridge: format!("br-{short_id}"),
        subnet,
        icc: true,
        masquerade: true,
        internal: raw.internal,
        binding: Ipv6Addr::UNSPECIFIED,
    };

    if let Some(name) = raw.options.get(OPT_BRIDGE_NAME) {
        network.bridge = name.clone();
    }

    if let Some(value) = raw.options.get(OPT_ENABLE_ICC) {
        match parse_bool(value) {
            Some(icc) => network.icc = icc,
            None => info!(network = %raw.id, "invalid value for {OPT_ENABLE_ICC}"),
        }
    }

    if let Some(value) = raw.options.get(OPT_ENABLE_MASQUERADE) {
        match parse_bool(value) {
            Some(masquerade) => network.masquerade = masquerade,
            None => info!(network = %raw.id, "invalid value for {OPT_ENABLE_MASQUERADE}"),
        }
    }

    if let Some(value) = raw.options.get(OPT_HOST_BINDING_IPV6) {
        match value.parse::<Ipv6Addr>() {
            Ok(addr) if addr.to_ipv4_mapped().is_none() => network.binding = addr,
            _ => info!(network = %raw.id, "invalid value for {OPT_HOST_BINDING_IPV6}"),
        }
    }

    Some(network)
}

/// Parse a container snapshot into a managed container.
///
/// The container is matched on the first attached network that is known,
/// not internal, and gave it a ULA address. A container without any
/// usable publish binding is not managed.
pub fn parse_container(
    raw: &ContainerSnapshot,
    networks: &HashMap<String, ManagedNetwork>,
    mapping: &AddressMapping,
) -> Option<ManagedContainer> {
    let (network, address) = raw.networks.iter().find_map(|attached| {
        let ip = attached.global_ipv6.parse::<Ipv6Addr>().ok()?;
        if !is_ula(ip) {
            return None;
        }
        let network = networks.get(&attached.network_id)?;
        (!network.internal).then_some((network, ip))
    })?;

    let mut ports = Vec::new();
    for binding in &raw.ports {
        let Ok(proto) = binding.proto.parse::<Protocol>() else {
            info!(
                container = %raw.id,
                proto = %binding.proto,
                "skipping binding with unsupported protocol"
            );
            continue;
        };

        let Some(port) = parse_port(&binding.container_port) else {
            info!(
                container = %raw.id,
                port = %binding.container_port,
                "invalid container port"
            );
            continue;
        };

        let mut host_address = network.binding;
        if !binding.host_ip.is_empty() && binding.host_ip != "0.0.0.0" {
            let Some(addr) = resolve_host_ip(&binding.host_ip, mapping) else {
                // IPv4-only binding with no mapping, or garbage
                continue;
            };
            host_address = addr;
        }

        let Some(host_port) = parse_port(&binding.host_port) else {
            info!(
                container = %raw.id,
                port = %binding.host_port,
                "invalid host port"
            );
            continue;
        };

        ports.push(ManagedPort {
            port,
            proto,
            host_address,
            host_port,
        });
    }

    if ports.is_empty() {
        return None;
    }

    Some(ManagedContainer {
        id: raw.id.clone(),
        bridge: network.bridge.clone(),
        address,
        ports,
    })
}

/// An explicit binding address, remapped to IPv6 where possible.
fn resolve_host_ip(host_ip: &str, mapping: &AddressMapping) -> Option<Ipv6Addr> {
    match host_ip.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => remap(v4, mapping),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => remap(v4, mapping),
            None => Some(v6),
        },
    }
}

fn remap(v4: Ipv4Addr, mapping: &AddressMapping) -> Option<Ipv6Addr> {
    let (prefix, v6) = mapping.lookup(v4)?;
    info!(from = %v4, to = %v6, matching = %prefix, "converting listen address");
    Some(v6)
}

/// Ports are published in 1..=65535; 0 is not a bindable port.
fn parse_port(raw: &str) -> Option<u16> {
    match raw.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

/// The value grammar of Docker's boolean network options.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::inventory::entity::{AttachedNetwork, PortBindingSnapshot};

    use super::*;

    fn bridge_snapshot(id: &str, subnets: &[&str]) -> NetworkSnapshot {
        NetworkSnapshot {
            id: id.to_string(),
            driver: "bridge".to_string(),
            internal: false,
            subnets: subnets.iter().map(|s| (*s).to_string()).collect(),
            options: HashMap::new(),
        }
    }

    fn known_networks() -> HashMap<String, ManagedNetwork> {
        let snapshot = bridge_snapshot(
            "deadbeef0000deadbeef0000deadbeef",
            &["172.18.0.0/16", "fd00::/64"],
        );
        let network = parse_network(&snapshot).unwrap();
        HashMap::from([(network.id.clone(), network)])
    }

    fn container_snapshot(bindings: Vec<PortBindingSnapshot>) -> ContainerSnapshot {
        ContainerSnapshot {
            id: "cafe000000000000".to_string(),
            networks: vec![AttachedNetwork {
                network_id: "deadbeef0000deadbeef0000deadbeef".to_string(),
                global_ipv6: "fd00::2".to_string(),
            }],
            ports: bindings,
        }
    }

    fn tcp_binding(container_port: &str, host_ip: &str, host_port: &str) -> PortBindingSnapshot {
        PortBindingSnapshot {
            container_port: container_port.to_string(),
            proto: "tcp".to_string(),
            host_ip: host_ip.to_string(),
            host_port: host_port.to_string(),
        }
    }

    // ── Networks ───────────────────────────────────────────────────

    #[test]
    fn bridge_with_ula_subnet_is_managed() {
        let network = parse_network(&bridge_snapshot(
            "deadbeef0000deadbeef0000deadbeef",
            &["172.18.0.0/16", "fd00::/64"],
        ))
        .unwrap();

        assert_eq!(network.bridge, "br-deadbeef0000");
        assert_eq!(network.subnet.to_string(), "fd00::/64");
        assert!(network.icc);
        assert!(network.masquerade);
        assert_eq!(network.binding, Ipv6Addr::UNSPECIFIED);
    }

    #[test]
    fn non_bridge_driver_is_ignored() {
        let mut snapshot = bridge_snapshot("feed0000feed", &["fd00::/64"]);
        snapshot.driver = "overlay".to_string();
        assert!(parse_network(&snapshot).is_none());
    }

    #[test]
    fn global_subnet_is_ignored() {
        let snapshot = bridge_snapshot("feed0000feed", &["2001:db8::/64"]);
        assert!(parse_network(&snapshot).is_none());
    }

    #[test]
    fn ipv4_only_network_is_ignored() {
        let snapshot = bridge_snapshot("feed0000feed", &["172.18.0.0/16"]);
        assert!(parse_network(&snapshot).is_none());
    }

    #[test]
    fn first_ula_subnet_wins() {
        let network = parse_network(&bridge_snapshot(
            "feed0000feed",
            &["2001:db8::/64", "fd01::/64", "fd02::/64"],
        ))
        .unwrap();
        assert_eq!(network.subnet.to_string(), "fd01::/64");
    }

    #[test]
    fn subnet_is_normalized_to_its_network_address() {
        let network =
            parse_network(&bridge_snapshot("feed0000feed", &["fd00::1:2:3:4/64"])).unwrap();
        assert_eq!(network.subnet.to_string(), "fd00::/64");
    }

    #[test]
    fn options_override_defaults() {
        let mut snapshot = bridge_snapshot("feed0000feed", &["fd00::/64"]);
        snapshot.options = HashMap::from([
            (OPT_BRIDGE_NAME.to_string(), "docker-v6".to_string()),
            (OPT_ENABLE_ICC.to_string(), "false".to_string()),
            (OPT_ENABLE_MASQUERADE.to_string(), "0".to_string()),
            (OPT_HOST_BINDING_IPV6.to_string(), "fd00::1".to_string()),
        ]);

        let network = parse_network(&snapshot).unwrap();
        assert_eq!(network.bridge, "docker-v6");
        assert!(!network.icc);
        assert!(!network.masquerade);
        assert_eq!(network.binding, "fd00::1".parse::<Ipv6Addr>().unwrap());
    }

    #[test]
    fn malformed_icc_option_keeps_default() {
        let mut snapshot = bridge_snapshot("feed0000feed", &["fd00::/64"]);
        snapshot.options = HashMap::from([(OPT_ENABLE_ICC.to_string(), "notabool".to_string())]);
        assert!(parse_network(&snapshot).unwrap().icc);
    }

    #[test]
    fn ipv4_host_binding_option_keeps_default() {
        let mut snapshot = bridge_snapshot("feed0000feed", &["fd00::/64"]);
        for bad in ["10.0.0.1", "::ffff:10.0.0.1", "nonsense"] {
            snapshot.options =
                HashMap::from([(OPT_HOST_BINDING_IPV6.to_string(), bad.to_string())]);
            let network = parse_network(&snapshot).unwrap();
            assert_eq!(network.binding, Ipv6Addr::UNSPECIFIED, "value: {bad}");
        }
    }

    // ── Containers ─────────────────────────────────────────────────

    #[test]
    fn published_port_on_known_network_is_managed() {
        let networks = known_networks();
        let snapshot = container_snapshot(vec![tcp_binding("80", "", "8080")]);

        let container =
            parse_container(&snapshot, &networks, &AddressMapping::default()).unwrap();
        assert_eq!(container.bridge, "br-deadbeef0000");
        assert_eq!(container.address, "fd00::2".parse::<Ipv6Addr>().unwrap());
        assert_eq!(container.ports.len(), 1);
        assert_eq!(container.ports[0].port, 80);
        assert_eq!(container.ports[0].host_port, 8080);
        assert_eq!(container.ports[0].host_address, Ipv6Addr::UNSPECIFIED);
    }

    #[test]
    fn unknown_network_is_not_managed() {
        let snapshot = container_snapshot(vec![tcp_binding("80", "", "8080")]);
        assert!(parse_container(&snapshot, &HashMap::new(), &AddressMapping::default()).is_none());
    }

    #[test]
    fn internal_network_is_not_managed() {
        let mut networks = known_networks();
        for network in networks.values_mut() {
            network.internal = true;
        }
        let snapshot = container_snapshot(vec![tcp_binding("80", "", "8080")]);
        assert!(parse_container(&snapshot, &networks, &AddressMapping::default()).is_none());
    }

    #[test]
    fn non_ula_address_is_not_managed() {
        let networks = known_networks();
        let mut snapshot = container_snapshot(vec![tcp_binding("80", "", "8080")]);
        snapshot.networks[0].global_ipv6 = "2001:db8::2".to_string();
        assert!(parse_container(&snapshot, &networks, &AddressMapping::default()).is_none());
    }

    #[test]
    fn ipv4_only_binding_without_mapping_is_not_managed() {
        let networks = known_networks();
        let snapshot = container_snapshot(vec![tcp_binding("80", "10.1.2.3", "8080")]);
        assert!(parse_container(&snapshot, &networks, &AddressMapping::default()).is_none());
    }

    #[test]
    fn ipv4_binding_is_remapped() {
        let networks = known_networks();
        let mapping: AddressMapping = "10.0.0.0/8=fd00::1".parse().unwrap();
        let snapshot = container_snapshot(vec![tcp_binding("80", "10.1.2.3", "8080")]);

        let container = parse_container(&snapshot, &networks, &mapping).unwrap();
        assert_eq!(
            container.ports[0].host_address,
            "fd00::1".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn wildcard_v4_binding_uses_network_default() {
        let networks = known_networks();
        let snapshot = container_snapshot(vec![tcp_binding("80", "0.0.0.0", "8080")]);
        let container =
            parse_container(&snapshot, &networks, &AddressMapping::default()).unwrap();
        assert_eq!(container.ports[0].host_address, Ipv6Addr::UNSPECIFIED);
    }

    #[test]
    fn explicit_v6_binding_is_kept() {
        let networks = known_networks();
        let snapshot = container_snapshot(vec![tcp_binding("80", "fd00::10", "8080")]);
        let container =
            parse_container(&snapshot, &networks, &AddressMapping::default()).unwrap();
        assert_eq!(
            container.ports[0].host_address,
            "fd00::10".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn invalid_ports_are_skipped() {
        let networks = known_networks();
        let snapshot = container_snapshot(vec![
            tcp_binding("0", "", "8080"),
            tcp_binding("80", "", "notaport"),
            tcp_binding("65536", "", "8080"),
            PortBindingSnapshot {
                container_port: "53".to_string(),
                proto: "icmp".to_string(),
                host_ip: String::new(),
                host_port: "53".to_string(),
            },
        ]);
        assert!(parse_container(&snapshot, &networks, &AddressMapping::default()).is_none());
    }

    #[test]
    fn sctp_binding_is_supported() {
        let networks = known_networks();
        let mut snapshot = container_snapshot(vec![]);
        snapshot.ports.push(PortBindingSnapshot {
            container_port: "9899".to_string(),
            proto: "sctp".to_string(),
            host_ip: String::new(),
            host_port: "9899".to_string(),
        });
        let container =
            parse_container(&snapshot, &networks, &AddressMapping::default()).unwrap();
        assert_eq!(container.ports[0].proto, Protocol::Sctp);
    }
}
