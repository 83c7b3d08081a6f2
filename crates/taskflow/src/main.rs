//! TaskFlow CLI binary.

use std::process::ExitCode;

use taskflow::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the taskflow CLI.
///
/// Uses tokio's current_thread runtime; the only background work is the
/// event pump of `taskflow watch`.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Logs go to stderr so `--json` output stays parseable.
    // Example: RUST_LOG=taskflow=debug,taskflow_jsonl=trace taskflow board
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("taskflow=info,taskflow_jsonl=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Starting taskflow CLI");

    let cli = Cli::parse_args();
    match cli.execute().await {
        Ok(()) => {
            tracing::debug!("TaskFlow CLI completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            let message = e
                .downcast_ref::<taskflow::Error>()
                .map_or_else(|| format!("{e:#}"), taskflow::Error::user_message);
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}
