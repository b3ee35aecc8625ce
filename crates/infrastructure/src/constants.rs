use std::time::Duration;

// ── Event loop ─────────────────────────────────────────────────────

/// Buffer between the Docker event stream and the watcher. Deep enough
/// to absorb a burst while a reconcile is writing to the kernel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Ping cadence while connected, and the back-off after a lost
/// connection before the listener is reopened.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);
