//! CLI, configuration, reply generation and the chat assistant
//!
//! This crate provides the `taffy` command-line interface.

pub mod assistant;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gemini;
pub mod secret;

pub use assistant::{Assistant, SessionView};
pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use gemini::{GeminiClient, ReplyGenerator};
