//! Subcommand implementations.

pub mod auth_url;
pub mod callback;
pub mod chat;
pub mod config;
pub mod sign_out;

use taffy_providers::google::GoogleConfig;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Builds the provider configuration from the `[google]` section.
fn google_config(config: &ClientConfig) -> ClientResult<GoogleConfig> {
    config
        .google()
        .and_then(|google| google.to_provider_config())
        .map_err(ClientError::Config)
}

fn http_client(config: &GoogleConfig) -> ClientResult<reqwest::Client> {
    config
        .http_client()
        .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))
}
