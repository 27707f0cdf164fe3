#[macro_use]
extern crate log;

use crate::config::Config;
use crate::events::Bus;
use crate::orchestrator::{Orchestrator, RunOutcome};

pub mod command;
pub mod config;
pub mod events;
pub mod interface;
pub mod orchestrator;
pub mod platform;
pub mod privilege;
pub mod proxy;
pub mod selector;
pub mod supervisor;

/// Routes the host's traffic through the configured proxy until `tun2socks` exits.
///
/// Progress is published on the given bus; the returned outcome says how the run ended.
pub async fn start_tunnel(config: Config, bus: Bus) -> RunOutcome {
    Orchestrator::new(config.tunnel_path, config.proxy, bus)
        .with_readiness(config.readiness)
        .run()
        .await
}
