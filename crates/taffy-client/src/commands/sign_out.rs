//! Sign-out outside a chat session.

use taffy_providers::google::{SessionStore, revoke_token};
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Revokes the stored redirect-grant token and removes it.
pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    let google = super::google_config(config)?;
    let http = super::http_client(&google)?;
    let store = config.session_store();

    if forget(&store, &http, &google.revoke_url).await? {
        println!("Signed out of Google Calendar.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

/// Returns whether a token was present. A failed revocation still clears
/// the local token.
async fn forget(store: &SessionStore, http: &reqwest::Client, revoke_url: &str) -> ClientResult<bool> {
    let Some(token) = store.token()? else {
        return Ok(false);
    };

    if let Err(e) = revoke_token(http, revoke_url, &token.access_token).await {
        warn!(error = %e, "token revocation failed");
    }
    store.clear_token()?;
    info!("stored token cleared");
    Ok(true)
}
