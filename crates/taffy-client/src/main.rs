//! taffy CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use taffy_client::cli::{Cli, Command, ConfigAction};
use taffy_client::commands;
use taffy_client::config::ClientConfig;
use taffy_client::error::{ClientError, ClientResult};
use taffy_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let (config_path, mut config) = load_config(&cli)?;
    config.apply(cli.overrides().map_err(ClientError::Config)?);

    let tracing_config = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::chat()
    };
    init_tracing(tracing_config)?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => commands::chat::run(&config).await,
        Command::Callback { url } => commands::callback::run(&url, &config),
        Command::AuthUrl { open } => commands::auth_url::run(open, &config),
        Command::SignOut => commands::sign_out::run(&config).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}

/// An explicit `--config` must exist; the default path may be missing.
fn load_config(cli: &Cli) -> ClientResult<(PathBuf, ClientConfig)> {
    let config = match cli.config {
        Some(ref path) => (path.clone(), ClientConfig::load_from(path)),
        None => (ClientConfig::default_path(), ClientConfig::load()),
    };
    let (path, loaded) = config;
    Ok((path, loaded.map_err(ClientError::Config)?))
}
