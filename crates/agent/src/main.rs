#![forbid(unsafe_code)]

mod cli;
mod watcher;

use std::process::ExitCode;

use adapters::docker::DockerRuntime;
use adapters::netfilter::NetfilterCli;
use application::hairpin::detect_hairpin_mode;
use application::manager::RuleManager;
use application::state::State;
use domain::mapping::entity::AddressMapping;
use infrastructure::config::LogLevel;
use infrastructure::constants::EVENT_CHANNEL_CAPACITY;
use infrastructure::logging::init_logging;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::watcher::Watcher;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::parse();

    let level = if cli.debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    init_logging(level, cli.log_format);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mapping: AddressMapping = cli.map_ipv4.as_deref().unwrap_or_default().parse()?;
    if !mapping.is_empty() {
        info!(entries = mapping.len(), "IPv4 to IPv6 binding map loaded");
    }

    // IPv4 is only ever read, and only here.
    let hairpin = detect_hairpin_mode(&NetfilterCli::ipv4())?;
    info!(hairpin, "hairpin mode detected");

    let manager = RuleManager::new(Box::new(NetfilterCli::ipv6()), hairpin)?;
    let state = State::new(manager, mapping);

    let client = DockerRuntime::connect_from_env(EVENT_CHANNEL_CAPACITY)?;
    let mut watcher = Watcher::new(client, state, cli.retry);

    let result = watcher.watch().await;

    if cli.cleanup {
        info!("removing all managed rules and chains");
        if let Err(err) = watcher.state_mut().cleanup() {
            warn!("cleanup failed: {err}");
        }
    }

    result.map_err(Into::into)
}
