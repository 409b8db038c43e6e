mod cli;
mod infrastructure;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use crate::infrastructure::{
    config::{build_config, CommonConfig},
    service_provider::ServiceProvider,
    telemetry::initialize_telemetry,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let config = match build_config(cli.config.as_deref()) {
        Ok(x) => x,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to build config".red());
            return ExitCode::FAILURE;
        }
    };

    let common_config: CommonConfig = config.get("common").unwrap_or_default();
    if let Err(e) = initialize_telemetry(common_config.telemetry()) {
        eprintln!("{}: {e}", "Failed to initialize logger".red());
        return ExitCode::FAILURE;
    }

    let service_provider = match ServiceProvider::build(config).await {
        Ok(x) => x,
        Err(e) => {
            eprintln!("{}: {e:#}", "Cannot build Service Provider".red());
            return ExitCode::FAILURE;
        }
    };

    match cli::run(cli.command, &service_provider).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("{}: {e:#}", "Command failed".red());
            ExitCode::FAILURE
        }
    }
}
