use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_zenoh_runtime::config::DrivetrainConfig;

/// Swerve drive runtime: 50 Hz control loop over zenoh with simulated modules
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Drivetrain config (TOML); defaults to the 3ft square base
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init(); // installs the subscriber globally

    let args = Args::parse();

    if let Some(path) = &args.config {
        info!("Loading drivetrain config from {}", path.display());
    }
    let config = match DrivetrainConfig::load_or_default(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Config error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = swerve_zenoh_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
