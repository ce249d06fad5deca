//! Partload CLI - Main entry point

use clap::Parser;
use partload_cli::{commands, date_range, Cli, Commands};
use partload_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use partload_core::config::PipelineConfig;
use partload_core::runtime::build_orchestrator;
use std::process;
use std::sync::Arc;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("partload-cli")
        .build();

    // the CLI still works when logging cannot be set up
    let _guard = log_config
        .with_env_overrides()
        .ok()
        .and_then(|config| init_logging(&config).ok());

    match execute(cli.command).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    }
}

/// Run `command`; `Ok(false)` means it ran but an ingestion failed.
async fn execute(command: Commands) -> anyhow::Result<bool> {
    let config = PipelineConfig::load()?;
    let orchestrator = Arc::new(build_orchestrator(&config).await?);

    match command {
        Commands::Run { target_date, json } => {
            commands::run::run(orchestrator, &target_date, json).await
        }
        Commands::Backfill {
            from,
            to,
            dates,
            pending,
        } => {
            let dates = match (from, to) {
                (Some(from), Some(to)) => date_range(from, to)?,
                _ if pending => commands::backfill::pending_dates(&orchestrator).await?,
                _ => dates,
            };
            commands::backfill::run(&orchestrator, dates).await
        }
        Commands::Pending => commands::pending::run(&orchestrator).await.map(|()| true),
        Commands::Status { target_date } => {
            commands::status::run(&orchestrator, &target_date).await.map(|()| true)
        }
    }
}
