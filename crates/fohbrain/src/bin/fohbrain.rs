//! fohbrain daemon binary
//!
//! Loads the channel map and tuning, connects to the telemetry/command
//! bus, and runs the control loop until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fohconf::FohConfig;

#[derive(Parser)]
#[command(name = "fohbrain")]
#[command(about = "Decision core for live mixing automation")]
#[command(version)]
struct Cli {
    /// Path to a config file (overrides ./fohbrain.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the merged configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = FohConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the config file when set.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("fohbrain {} starting", env!("CARGO_PKG_VERSION"));
    for path in &sources.files {
        info!("loaded config from {}", path.display());
    }
    info!(
        "{} channel(s) configured, duck targets {:?}",
        config.channels.len(),
        config.tuning.duck_targets
    );

    if cli.check_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    fohbrain::daemon::run(config).await
}
