use domain::common::error::RuntimeError;
use domain::inventory::entity::{ContainerSnapshot, NetworkSnapshot, RuntimeEvent};
use tokio::sync::mpsc;

/// Secondary port for the container runtime (the Docker daemon).
///
/// Objects that have disappeared between a listing and an inspect are a
/// normal race, so the inspect operations return `Ok(None)` for "no such
/// network/container" rather than an error.
///
/// Implemented by the bollard adapter in the adapter layer.
#[allow(async_fn_in_trait)]
pub trait RuntimePort: Send + Sync {
    /// Liveness probe against the daemon.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// All networks, regardless of driver.
    async fn list_networks(&self) -> Result<Vec<NetworkSnapshot>, RuntimeError>;

    /// One network by id; `None` if it no longer exists.
    async fn network_info(&self, id: &str) -> Result<Option<NetworkSnapshot>, RuntimeError>;

    /// Ids of all running containers.
    async fn list_containers(&self) -> Result<Vec<String>, RuntimeError>;

    /// One container by id; `None` if it no longer exists.
    async fn inspect_container(&self, id: &str)
        -> Result<Option<ContainerSnapshot>, RuntimeError>;

    /// Open a fresh event stream.
    ///
    /// The returned channel closes when the stream ends or fails, which
    /// the consumer treats as a connection interruption. Dropping the
    /// receiver tears the stream down.
    fn subscribe_events(&self) -> mpsc::Receiver<RuntimeEvent>;
}
