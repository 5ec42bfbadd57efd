use anyhow::Result;
use clap::Parser;
use gcloud_sdk_rs::cli::Cli;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; --verbose only changes the fallback level
    let fallback = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    info!("Starting gcloud-sdk-rs {}", gcloud_sdk_rs::VERSION);

    match cli.execute().await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Command execution failed: {:?}", e);
            eprintln!("Error: {}", e.user_message());
            std::process::exit(1);
        }
    }
}
