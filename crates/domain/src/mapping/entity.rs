use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::Ipv4Net;

use super::error::MappingError;

/// Ordered IPv4-prefix → IPv6-address substitutions for publish bindings.
///
/// Operators publish ports with Docker's IPv4-only binding syntax; when a
/// binding's host address falls inside one of these prefixes, the paired
/// IPv6 address is used instead. First match wins — this is a list, not a
/// longest-prefix table.
#[derive(Debug, Clone, Default)]
pub struct AddressMapping {
    entries: Vec<(Ipv4Net, Ipv6Addr)>,
}

impl AddressMapping {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The first entry whose prefix contains `ip`, if any.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<(Ipv4Net, Ipv6Addr)> {
        self.entries
            .iter()
            .copied()
            .find(|(net, _)| net.contains(&ip))
    }
}

impl FromStr for AddressMapping {
    type Err = MappingError;

    /// Parses `IPV4/CIDR=IPV6[,IPV4/CIDR=IPV6...]`. Entries without both
    /// halves are skipped, so the empty string parses to an empty mapping.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();

        for entry in s.split(',') {
            let parts: Vec<&str> = entry.split('=').collect();
            if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
                continue;
            }

            let prefix = parts[0]
                .parse::<Ipv4Net>()
                .map_err(|source| MappingError::InvalidPrefix {
                    entry: entry.to_string(),
                    source,
                })?
                .trunc();
            let address =
                parts[1]
                    .parse::<Ipv6Addr>()
                    .map_err(|source| MappingError::InvalidAddress {
                        entry: entry.to_string(),
                        source,
                    })?;

            entries.push((prefix, address));
        }

        Ok(Self { entries })
    }
}
