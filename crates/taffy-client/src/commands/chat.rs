//! Interactive chat session.

use std::io::Write;
use std::sync::Arc;

use taffy_core::Sender;
use taffy_providers::google::{LoopbackConsent, SessionManager, SessionStore, now_millis};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::assistant::{Assistant, SessionView};
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::gemini::GeminiClient;

const HELP: &str = "Commands: /signin, /signout, /status, /help, /quit";

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    SignIn,
    SignOut,
    Status,
    Help,
    Quit,
    Unknown(String),
    Say(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.strip_prefix('/') {
            Some(command) => match command.to_lowercase().as_str() {
                "signin" | "login" => Self::SignIn,
                "signout" | "logout" => Self::SignOut,
                "status" => Self::Status,
                "help" | "?" => Self::Help,
                "quit" | "exit" | "q" => Self::Quit,
                _ => Self::Unknown(line.to_string()),
            },
            None => Self::Say(line.to_string()),
        }
    }
}

/// Runs the chat until `/quit` or end of input.
pub async fn run(config: &ClientConfig) -> ClientResult<()> {
    let google = super::google_config(config)?;
    let http = super::http_client(&google)?;
    let timezone = config.timezone().map_err(crate::error::ClientError::Config)?;
    let gemini_key = config
        .assistant
        .resolve_api_key()
        .map_err(crate::error::ClientError::Config)?;

    let mut generator = GeminiClient::new(http.clone(), gemini_key, config.assistant.model.clone());
    if let Some(ref base_url) = config.assistant.base_url {
        generator = generator.with_base_url(base_url);
    }
    if !generator.is_configured() {
        warn!("no Gemini API key configured");
    }

    let store = config.session_store();
    let consent = Arc::new(LoopbackConsent::new(&google, http));
    let manager = SessionManager::mount(google, consent, store.clone())?;
    let mut assistant = Assistant::new(Arc::new(generator), timezone);

    info!(%timezone, "chat started");
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;
    loop {
        let view = observe(&manager, &store).await;
        assistant.refresh(&view, &store);
        printed = print_new(&assistant, printed);

        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ChatCommand::parse(&line) {
            ChatCommand::Quit => break,
            ChatCommand::Help => println!("{}", HELP),
            ChatCommand::Unknown(command) => println!("Unknown command {}. {}", command, HELP),
            ChatCommand::Status => println!("{}", describe(&view)),
            ChatCommand::SignIn => sign_in(&manager).await,
            ChatCommand::SignOut => match manager.sign_out().await {
                Ok(()) => println!("[Signed out of Google Calendar.]"),
                Err(e) => println!("[Sign-out failed: {}]", e.message()),
            },
            ChatCommand::Say(text) => {
                // The snapshot may have moved while the user was typing.
                let view = observe(&manager, &store).await;
                assistant.respond(&text, &view).await;
            }
        }
    }

    manager.unmount();
    Ok(())
}

async fn observe(manager: &SessionManager, store: &SessionStore) -> SessionView {
    let snapshot = manager.snapshot();
    let calendar = manager.calendar().await;
    let stored = store.token().unwrap_or_else(|e| {
        warn!(error = %e, "could not read stored token");
        None
    });
    SessionView::observe(&snapshot, calendar, stored.as_ref(), now_millis())
}

async fn sign_in(manager: &SessionManager) {
    println!("[Opening Google sign-in in your browser...]");
    match manager.sign_in().await {
        Ok(snapshot) if snapshot.is_signed_in => println!("[Signed in to Google Calendar.]"),
        Ok(snapshot) => {
            if let Some(error) = snapshot.auth_error {
                println!("[{}]", error);
            } else {
                println!("[Sign-in cancelled.]");
            }
        }
        Err(e) => println!("[{}]", e.message()),
    }
}

/// Prints messages after index `from`, skipping what the user typed.
fn print_new(assistant: &Assistant, from: usize) -> usize {
    let messages = assistant.transcript().messages();
    for message in messages.iter().skip(from) {
        if message.sender != Sender::User {
            println!("{}", message.render());
        }
    }
    messages.len()
}

fn describe(view: &SessionView) -> String {
    if let Some(ref error) = view.error {
        return format!("Google services failed: {}", error);
    }
    if view.is_loading {
        return "Google services are loading.".to_string();
    }
    match (view.is_signed_in, view.calendar.is_some()) {
        (true, true) => "Signed in; calendar ready.".to_string(),
        (true, false) => "Signed in; calendar not ready.".to_string(),
        (false, _) => "Not signed in. Type /signin to connect Google Calendar.".to_string(),
    }
}
