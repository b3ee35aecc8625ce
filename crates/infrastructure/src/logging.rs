use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LogLevel};

/// Wire up the global tracing subscriber.
///
/// The daemon logs to stdout only; it is expected to run under a
/// supervisor or in a container, so there is no file target and no
/// rotation. Text output is the compact single-line form — rule
/// add/remove lines at debug level are the bulk of the traffic and
/// multi-line rendering would drown them.
///
/// Call once, before the first log line.
pub fn init_logging(level: LogLevel, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(level_filter(level));

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_ansi(false)
                    .with_target(true),
            )
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().compact().with_target(true))
            .init(),
    }
}

/// `RUST_LOG` when set, otherwise everything at `level` and up.
///
/// The env var wins so a single module can be turned up
/// (`RUST_LOG=application::firewall=trace`) without restarting the
/// daemon with `--debug` and re-reconciling at full verbosity.
fn level_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}
