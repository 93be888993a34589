// Triptych
// Main entry point for the triptych binary

use anyhow::Context;
use clap::Parser;
use triptych_engine::cli::{Cli, Command};
use triptych_engine::config::Config;
use triptych_engine::handlers::{
    handle_answer, handle_doctor, handle_history, handle_replay, handle_run, OutputFormat,
};
use triptych_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        Config::load_or_create().context("Failed to load config")?
    };

    // RUST_LOG > --log > config file
    match &cli.log {
        Some(level) => init_telemetry_with_level(level),
        None => init_telemetry_with_level(&config.core.log_level),
    }

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("Triptych v{} ({} - {})", version, commit, timestamp);

    match cli.command {
        Command::Run { topic, file } => {
            tracing::info!("Starting run");
            handle_run(topic, file, &config, format).await
        }

        Command::Answer { run_id, response } => {
            tracing::info!("Answering run {}", run_id);
            handle_answer(run_id, response, &config, format).await
        }

        Command::History { limit } => {
            tracing::info!("Showing last {} runs", limit);
            handle_history(limit, &config, format).await
        }

        Command::Replay { run_id } => {
            tracing::info!("Replaying run {}", run_id);
            handle_replay(run_id, &config, format).await
        }

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
