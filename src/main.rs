//! Swagger Mock Server - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use swagger_mock_server::{server, ServerConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "swagger-mock-server",
    about = "Programmable mock server for OpenAPI described APIs - stored mock calls, example synthesis, and spec passthrough",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-server.yaml")]
    config: PathBuf,

    /// Listen address override (e.g., "0.0.0.0:5000")
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Print default config if requested
    if args.print_config {
        print!("{}", serde_yaml::to_string(&ServerConfig::default())?);
        return Ok(());
    }

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        ServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no APIs)");
        ServerConfig::default()
    };

    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!("Configuration is valid ({} APIs defined)", config.apis.len());
        return Ok(());
    }
    config.validate()?;

    server::run(config).await
}
