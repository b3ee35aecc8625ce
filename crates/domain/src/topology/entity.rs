use std::fmt;
use std::net::Ipv6Addr;

use ipnet::Ipv6Net;

// ── Address classification ──────────────────────────────────────────

/// Whether an address falls inside fc00::/7, the Unique Local Address
/// range of RFC 4193. This is the only IPv6 range the daemon manages;
/// global-scope and link-local addresses are left alone.
pub fn is_ula(addr: Ipv6Addr) -> bool {
    addr.octets()[0] & 0xfe == 0xfc
}

// ── Protocols ───────────────────────────────────────────────────────

/// Transport protocol of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Protocol {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            _ => Err(()),
        }
    }
}

// ── Managed topology ────────────────────────────────────────────────

/// A Docker bridge network with a ULA subnet, as tracked by state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedNetwork {
    pub id: String,
    /// Host bridge interface, `br-<id[..12]>` unless overridden.
    pub bridge: String,
    /// First IPAM subnet inside fc00::/7.
    pub subnet: Ipv6Net,
    /// Inter-container communication on the same bridge.
    pub icc: bool,
    /// Masquerade traffic leaving the subnet.
    pub masquerade: bool,
    pub internal: bool,
    /// Default host bind address for unspecified publish bindings.
    pub binding: Ipv6Addr,
}

/// A container with at least one published port on a managed,
/// non-internal network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedContainer {
    pub id: String,
    /// Bridge of the network the container was matched on.
    pub bridge: String,
    /// The container's ULA address on that network.
    pub address: Ipv6Addr,
    pub ports: Vec<ManagedPort>,
}

/// One published port binding, already resolved to an IPv6 host address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedPort {
    pub port: u16,
    pub proto: Protocol,
    pub host_address: Ipv6Addr,
    pub host_port: u16,
}
