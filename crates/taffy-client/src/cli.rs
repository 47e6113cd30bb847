//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

/// taffy - a scheduling assistant for Google Calendar
#[derive(Debug, Parser)]
#[command(name = "taffy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "TAFFY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    // --- Credential overrides ---
    /// OAuth client ID (from Google Cloud Console)
    #[arg(long, env = "GOOGLE_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// OAuth client secret (from Google Cloud Console)
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", global = true, hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Path to Google Cloud Console credentials JSON file
    ///
    /// Alternative to providing client_id and client_secret separately.
    #[arg(long, env = "GOOGLE_CREDENTIALS_FILE", global = true)]
    pub credentials_file: Option<PathBuf>,

    /// Calendar API key
    #[arg(long, env = "GOOGLE_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini API key for replies
    #[arg(long, env = "GEMINI_API_KEY", global = true, hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Session store directory
    #[arg(long, global = true)]
    pub session: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Collects the flags that override `config.toml`.
    ///
    /// A credentials file takes precedence over `--client-id` and
    /// `--client-secret`.
    pub fn overrides(&self) -> Result<Overrides, String> {
        let mut overrides = Overrides {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            api_key: self.api_key.clone(),
            gemini_api_key: self.gemini_api_key.clone(),
            session_dir: self.session.clone(),
        };

        if let Some(ref path) = self.credentials_file {
            let creds = taffy_providers::google::OAuthCredentials::from_file(path)?;
            overrides.client_id = Some(creds.client_id);
            if !creds.client_secret.is_empty() {
                overrides.client_secret = Some(creds.client_secret);
            }
        }

        Ok(overrides)
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chat with the assistant (default)
    Chat,

    /// Process a redirect grant landing on the callback route
    Callback {
        /// Full URL the browser was redirected to, fragment included
        url: String,
    },

    /// Print the URL that starts the redirect grant
    AuthUrl {
        /// Open the URL in the default browser
        #[arg(long)]
        open: bool,
    },

    /// Revoke and forget the stored Google token
    SignOut,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
