use domain::common::error::PacketFilterError;
use domain::rule::entity::{Chain, Table};

/// Secondary port for one address family of the kernel packet filter.
///
/// Rule specs are passed as the ordered token list that follows
/// `-t <table>` on the CLI; the implementation must not reorder or
/// normalize them, since callers rely on token-exact `exists` probes.
///
/// Implemented by the ip6tables adapter (and its iptables twin, used
/// read-only for hairpin detection).
pub trait PacketFilterPort: Send + Sync {
    /// Create a chain. Fails if it already exists.
    fn new_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError>;

    /// Flush a chain, creating it first when absent.
    fn clear_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError>;

    /// Delete an (empty) chain.
    fn delete_chain(&self, table: Table, chain: Chain) -> Result<(), PacketFilterError>;

    /// Names of all chains in a table, builtin and user-defined.
    fn list_chains(&self, table: Table) -> Result<Vec<String>, PacketFilterError>;

    /// Token-exact existence probe (`-C`).
    fn exists(&self, table: Table, chain: Chain, spec: &[String])
        -> Result<bool, PacketFilterError>;

    /// Insert at a 1-based position (`-I`).
    fn insert(
        &self,
        table: Table,
        chain: Chain,
        position: usize,
        spec: &[String],
    ) -> Result<(), PacketFilterError>;

    /// Append unless an equal rule already exists.
    fn append_unique(
        &self,
        table: Table,
        chain: Chain,
        spec: &[String],
    ) -> Result<(), PacketFilterError>;

    /// Delete one matching rule (`-D`).
    fn delete(&self, table: Table, chain: Chain, spec: &[String])
        -> Result<(), PacketFilterError>;
}
