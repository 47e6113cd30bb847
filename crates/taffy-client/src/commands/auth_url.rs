//! Redirect grant entry point.

use tracing::warn;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Prints the implicit-grant URL, optionally opening it in the browser.
///
/// After consent Google sends the browser to the configured redirect URI;
/// pass that full URL to `taffy callback`.
pub fn run(open_browser: bool, config: &ClientConfig) -> ClientResult<()> {
    let google = super::google_config(config)?;
    let url = google.implicit_grant_url();

    println!("{}", url);
    println!();
    println!(
        "After granting access, run: taffy callback '<the {} URL you land on>'",
        google.redirect_uri
    );

    if open_browser {
        if let Err(e) = open::that(&url) {
            warn!(error = %e, "could not open browser");
            eprintln!("Could not open a browser; copy the URL above instead.");
        }
    }

    Ok(())
}
