//! Redirect grant landing.

use taffy_providers::google::{RedirectCallback, RedirectOutcome, now_millis};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Processes the URL the browser was sent to after the implicit grant.
///
/// The token or the error lands in the session store for the next chat
/// session; the command then reports where the browser should go. A token
/// that could not be saved is an error rather than a sign-in.
pub fn run(url: &str, config: &ClientConfig) -> ClientResult<()> {
    let store = config.session_store();
    let callback = RedirectCallback::from_url(url)?;
    let now = now_millis();

    let outcome = callback.outcome(now);
    let redirect = callback.process(&store, now);

    if let RedirectOutcome::Token(ref token) = outcome {
        let saved = store.token().ok().flatten();
        if saved.as_ref() != Some(token) {
            return Err(ClientError::Provider(format!(
                "failed to save the Google token in {}",
                store.dir().display()
            )));
        }
    }

    let summary = describe(&outcome);
    info!(location = %redirect.location, "redirect processed");
    println!("{}", summary);
    println!("Continue at {}", redirect.location);
    Ok(())
}

fn describe(outcome: &RedirectOutcome) -> String {
    match outcome {
        RedirectOutcome::Token(_) => {
            "Signed in to Google Calendar. Start `taffy chat` to use it.".to_string()
        }
        RedirectOutcome::Empty => "Nothing to process in this URL.".to_string(),
        other => other
            .error_message()
            .unwrap_or_else(|| "Sign-in did not complete.".to_string()),
    }
}
