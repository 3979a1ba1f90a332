//! Skein CLI binary.

use anyhow::Result;
use skein_cli::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the skein CLI.
///
/// Uses tokio's current_thread runtime; every command is a short sequence of
/// local database calls.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Can be controlled via RUST_LOG environment variable
    // Example: RUST_LOG=skein=debug cargo run -- dep list octo/widgets#1
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("skein=info,skein_cli=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting skein CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    tracing::debug!("Skein CLI completed successfully");
    Ok(())
}
