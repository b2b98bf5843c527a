//! WorldPop command-line client.
//!
//! Resolves product/area/year requests against the WorldPop catalog,
//! downloads the matching country rasters into a local cache and merges them
//! into GeoTIFF output.

mod args;
mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use args::Cli;
use worldpop::WorldPopError;

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Process exit code for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<WorldPopError>()
        .map_or(1, |e| e.exit_code())
        .clamp(1, 255) as u8
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log_level, cli.json) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
