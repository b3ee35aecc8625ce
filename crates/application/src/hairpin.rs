use domain::common::error::PacketFilterError;
use domain::rule::entity::{Chain, Table};
use ports::secondary::packet_filter::PacketFilterPort;

/// Detect whether the Docker daemon runs with hairpin NAT
/// (`--userland-proxy=false`) by probing the IPv4 nat OUTPUT chain for
/// the rule dockerd installs at startup. Runs once at startup; the
/// result stays fixed for the process lifetime.
///
/// With the userland proxy enabled the rule excludes loopback
/// (`! -d 127.0.0.0/8`); without it the exclusion is absent. Old
/// iptables renders the /8 prefix as /32, so that variant is probed as
/// a fallback.
pub fn detect_hairpin_mode(port: &dyn PacketFilterPort) -> Result<bool, PacketFilterError> {
    let off_spec: Vec<String> = [
        "!",
        "-d",
        "127.0.0.0/8",
        "-m",
        "addrtype",
        "--dst-type",
        "LOCAL",
        "-j",
        "DOCKER",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();
    let on_spec = off_spec[3..].to_vec();

    if port.exists(Table::Nat, Chain::Output, &on_spec)? {
        return Ok(true);
    }

    if port.exists(Table::Nat, Chain::Output, &off_spec)? {
        return Ok(false);
    }

    let mut legacy_off_spec = off_spec;
    legacy_off_spec[2] = "127.0.0.0/32".to_string();

    if port.exists(Table::Nat, Chain::Output, &legacy_off_spec)? {
        return Ok(false);
    }

    Err(PacketFilterError::HairpinUndetectable)
}
