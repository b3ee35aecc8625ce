//! Typed snapshots of raw runtime objects.
//!
//! The Docker adapter converts API models into these; the topology
//! parser turns them into managed networks and containers. Values are
//! kept as strings here — validation happens in the parser, which knows
//! what to do with malformed input (log and skip).

use std::collections::HashMap;

/// A network as reported by the runtime.
#[derive(Debug, Clone, Default)]
pub struct NetworkSnapshot {
    pub id: String,
    pub driver: String,
    pub internal: bool,
    /// IPAM subnet strings, IPv4 and IPv6 mixed.
    pub subnets: Vec<String>,
    /// Driver options (`com.docker.network.bridge.*`).
    pub options: HashMap<String, String>,
}

/// A container as reported by the runtime.
#[derive(Debug, Clone, Default)]
pub struct ContainerSnapshot {
    pub id: String,
    pub networks: Vec<AttachedNetwork>,
    pub ports: Vec<PortBindingSnapshot>,
}

/// One endpoint of a container on a network.
#[derive(Debug, Clone)]
pub struct AttachedNetwork {
    pub network_id: String,
    /// `GlobalIPv6Address` of the endpoint; empty when unset.
    pub global_ipv6: String,
}

/// One host binding of a published container port.
#[derive(Debug, Clone)]
pub struct PortBindingSnapshot {
    pub container_port: String,
    pub proto: String,
    /// Empty when the binding has no explicit host address.
    pub host_ip: String,
    pub host_port: String,
}

// ── Events ──────────────────────────────────────────────────────────

/// Coarse classification of a runtime event's subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Network,
    Container,
    Other,
}

/// One record from the runtime event stream.
#[derive(Debug, Clone)]
pub struct RuntimeEvent {
    pub kind: EventKind,
    pub action: String,
    pub actor_id: String,
    pub attributes: HashMap<String, String>,
}
