#[cfg(feature = "bin")]
#[macro_use]
extern crate log;

#[cfg(feature = "bin")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use socksvpn::config::Config;
    use socksvpn::events::Bus;
    use socksvpn::orchestrator::Terminal;

    let config = Config::from_args().with_context(|| "Failed to read config")?;
    init_logger(&config)?;

    info!(
        "socksvpn {} on {}/{}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    info!(
        "Tunnelling all traffic via [{}] using {}",
        config.proxy,
        config.tunnel_path.display()
    );

    let outcome = socksvpn::start_tunnel(config, Bus::default()).await;

    for failed in outcome.report.failed_commands() {
        warn!("Configuration step did not succeed: {} ({})", failed.spec, failed.outcome);
    }

    match outcome.terminal {
        Terminal::Exited(_) => Ok(()),
        Terminal::Failed(failure) => Err(anyhow::anyhow!("{}", failure)),
    }
}

#[cfg(not(feature = "bin"))]
fn main() {}

#[cfg(feature = "bin")]
fn init_logger(config: &socksvpn::config::Config) -> anyhow::Result<()> {
    use anyhow::Context;

    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder.parse_filters(&config.log);
    builder
        .try_init()
        .with_context(|| "Failed to initialize logger")
}
