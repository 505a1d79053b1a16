use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ripd::runtime::config::load_router_config;
use ripd::runtime::daemon::RouterDaemon;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ripd")]
#[command(about = "RIP-style distance-vector routing daemon over UDP loopback")]
struct Args {
    /// Path to the router configuration file.
    config: PathBuf,
    #[arg(long, default_value = "INFO")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let cfg = load_router_config(&args.config)?;
    let mut daemon = RouterDaemon::new(cfg)?;
    daemon.run_forever()?;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();
    Ok(())
}
