use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use smssyncd::bootstrap::Server;
use smssyncd::config::Config;
use smssyncd::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "smssyncd")]
#[command(author, version, about = "SMS device gateway to message bus adapter")]
struct Args {
    /// Path to config file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "/etc/smssyncd/config.yaml"
    )]
    config: PathBuf,

    /// Validate config and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration first (to get log settings)
    let config = Config::load(&args.config)?;

    // Initialize tracing with config-based settings
    init_tracing(&config.telemetry)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "starting smssyncd"
    );

    // Validate only mode
    if args.validate {
        info!("configuration is valid");
        return Ok(());
    }

    // Create and run server
    let server = Server::new(config);
    server.run().await?;

    Ok(())
}
