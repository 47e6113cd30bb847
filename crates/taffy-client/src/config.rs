//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/taffy/config.toml` by default.
//!
//! Credential values (`client_id`, `client_secret`, `api_key`,
//! `gemini_api_key`) support secret references:
//! - `pass::path/in/store`, resolved via `pass show`
//! - `env::VAR_NAME`, resolved from the environment
//! - plain text, used as-is

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use taffy_providers::google::{GoogleConfig, OAuthCredentials, SessionStore};

use crate::secret;

/// Default Gemini model for replies.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the taffy client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google identity and calendar settings.
    pub google: Option<GoogleSettings>,

    /// Reply generator settings.
    pub assistant: AssistantSettings,

    /// Debug mode.
    pub debug: bool,
}

/// Reply generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// Gemini API key (supports `pass::` and `env::` prefixes). Without it
    /// every reply is the "not configured" fallback.
    pub gemini_api_key: Option<String>,

    pub model: String,

    /// Override for the Generative Language API root.
    pub base_url: Option<String>,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
        }
    }
}

impl AssistantSettings {
    pub fn resolve_api_key(&self) -> Result<Option<String>, String> {
        secret::resolve_opt(self.gemini_api_key.as_deref())
            .map_err(|e| format!("failed to resolve gemini_api_key: {}", e))
    }
}

/// Values given on the command line or through the environment; they win
/// over `config.toml`.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub session_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taffy")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taffy")
    }

    /// Applies command-line overrides, creating the `[google]` section when
    /// one of its values is given.
    pub fn apply(&mut self, overrides: Overrides) {
        let touches_google = overrides.client_id.is_some()
            || overrides.client_secret.is_some()
            || overrides.api_key.is_some()
            || overrides.session_dir.is_some();
        if touches_google {
            let google = self.google.get_or_insert_with(GoogleSettings::default);
            if overrides.client_id.is_some() {
                google.client_id = overrides.client_id;
            }
            if overrides.client_secret.is_some() {
                google.client_secret = overrides.client_secret;
            }
            if overrides.api_key.is_some() {
                google.api_key = overrides.api_key;
            }
            if overrides.session_dir.is_some() {
                google.session = overrides.session_dir;
            }
        }
        if overrides.gemini_api_key.is_some() {
            self.assistant.gemini_api_key = overrides.gemini_api_key;
        }
    }

    /// The `[google]` section, or a message telling the user how to add it.
    pub fn google(&self) -> Result<&GoogleSettings, String> {
        self.google.as_ref().ok_or_else(missing_google_message)
    }

    /// Timezone used for scheduling: `[google] timezone`, then `$TZ`, then UTC.
    pub fn timezone(&self) -> Result<Tz, String> {
        let configured = self.google.as_ref().and_then(|g| g.timezone.clone());
        let name = configured.or_else(|| std::env::var("TZ").ok().filter(|tz| !tz.is_empty()));
        match name {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| format!("unknown timezone: {}", name)),
            None => Ok(Tz::UTC),
        }
    }

    /// The store shared by the redirect callback and the chat session.
    pub fn session_store(&self) -> SessionStore {
        let dir = self
            .google
            .as_ref()
            .and_then(|g| g.session.clone())
            .unwrap_or_else(|| Self::default_data_dir().join("session"));
        SessionStore::new(dir)
    }
}

fn missing_google_message() -> String {
    format!(
        "Google settings not found. Add to {}:\n  \
         [google]\n  \
         client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
         api_key = \"YOUR_API_KEY\"",
        ClientConfig::default_path().display()
    )
}

// ---------------------------------------------------------------------------
// GoogleSettings
// ---------------------------------------------------------------------------

/// Google identity and calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret, needed for the loopback code exchange of
    /// desktop clients (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Calendar API key (supports `pass::` and `env::` prefixes).
    pub api_key: Option<String>,

    /// IANA timezone name for scheduled events.
    pub timezone: Option<String>,

    /// Session store directory.
    pub session: Option<PathBuf>,

    /// Redirect URI registered for the implicit grant.
    pub redirect_uri: Option<String>,
}

impl GoogleSettings {
    /// Resolves credentials, expanding `pass::` and `env::` references.
    ///
    /// `client_id` is required; a missing `client_secret` resolves to empty.
    pub(crate) fn resolve_credentials(&self) -> Result<OAuthCredentials, String> {
        let raw_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| "client_id is missing from [google] section in config.toml".to_string())?;

        let client_id = secret::resolve(raw_id)
            .map_err(|e| format!("failed to resolve client_id: {}", e))?;
        let client_secret = secret::resolve_opt(self.client_secret.as_deref())
            .map_err(|e| format!("failed to resolve client_secret: {}", e))?
            .unwrap_or_default();

        Ok(OAuthCredentials::new(client_id, client_secret))
    }

    pub(crate) fn resolve_api_key(&self) -> Result<String, String> {
        let raw = self
            .api_key
            .as_deref()
            .ok_or_else(|| "api_key is missing from [google] section in config.toml".to_string())?;
        secret::resolve(raw).map_err(|e| format!("failed to resolve api_key: {}", e))
    }

    /// Converts to provider configuration.
    pub fn to_provider_config(&self) -> Result<GoogleConfig, String> {
        let credentials = self.resolve_credentials()?;
        let api_key = self.resolve_api_key()?;

        let mut config = GoogleConfig::new(credentials, api_key);
        if let Some(ref uri) = self.redirect_uri {
            config = config.with_redirect_uri(uri);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> GoogleSettings {
        GoogleSettings {
            client_id: Some("test-id.apps.googleusercontent.com".to_string()),
            client_secret: Some("test-secret".to_string()),
            api_key: Some("test-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn resolve_credentials_plain_text() {
        let creds = settings().resolve_credentials().unwrap();
        assert_eq!(creds.client_id, "test-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
    }

    #[test]
    fn resolve_credentials_env_prefix() {
        unsafe {
            std::env::set_var("_TAFFY_TEST_CLIENT_ID", "env-id.apps.googleusercontent.com");
            std::env::set_var("_TAFFY_TEST_API_KEY", "env-key");
        }

        let settings = GoogleSettings {
            client_id: Some("env::_TAFFY_TEST_CLIENT_ID".to_string()),
            api_key: Some("env::_TAFFY_TEST_API_KEY".to_string()),
            ..Default::default()
        };
        let config = settings.to_provider_config().unwrap();
        assert_eq!(config.credentials.client_id, "env-id.apps.googleusercontent.com");
        assert_eq!(config.api_key, "env-key");

        unsafe {
            std::env::remove_var("_TAFFY_TEST_CLIENT_ID");
            std::env::remove_var("_TAFFY_TEST_API_KEY");
        }
    }

    #[test]
    fn missing_secret_resolves_empty() {
        let settings = GoogleSettings {
            client_secret: None,
            ..settings()
        };
        assert_eq!(settings.resolve_credentials().unwrap().client_secret, "");
    }

    #[test]
    fn missing_id_errors() {
        let settings = GoogleSettings {
            client_id: None,
            ..settings()
        };
        assert!(settings.resolve_credentials().unwrap_err().contains("client_id"));
    }

    #[test]
    fn missing_api_key_errors() {
        let settings = GoogleSettings {
            api_key: None,
            ..settings()
        };
        assert!(settings.to_provider_config().unwrap_err().contains("api_key"));
    }

    #[test]
    fn foreign_client_id_is_rejected() {
        let settings = GoogleSettings {
            client_id: Some("not-a-google-id".to_string()),
            ..settings()
        };
        assert!(settings.to_provider_config().is_err());
    }

    #[test]
    fn redirect_uri_override() {
        let settings = GoogleSettings {
            redirect_uri: Some("http://localhost:3000/oauth2callback".to_string()),
            ..settings()
        };
        let config = settings.to_provider_config().unwrap();
        assert_eq!(config.redirect_uri, "http://localhost:3000/oauth2callback");
    }

    #[test]
    fn config_toml_sections() {
        let toml_content = r#"
[google]
client_id = "toml-id.apps.googleusercontent.com"
api_key = "toml-key"
timezone = "Europe/Paris"
session = "/tmp/taffy-session"

[assistant]
gemini_api_key = "gem"
"#;
        let config: ClientConfig = toml::from_str(toml_content).unwrap();
        let google = config.google().unwrap();
        assert_eq!(google.api_key.as_deref(), Some("toml-key"));
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Paris);
        assert_eq!(
            config.session_store().dir(),
            Path::new("/tmp/taffy-session")
        );
        assert_eq!(config.assistant.model, DEFAULT_MODEL);
        assert_eq!(
            config.assistant.resolve_api_key().unwrap().as_deref(),
            Some("gem")
        );
    }

    #[test]
    fn empty_config_has_no_google_section() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert!(config.google().unwrap_err().contains("[google]"));
        assert_eq!(config.assistant.resolve_api_key().unwrap(), None);
    }

    #[test]
    fn unknown_timezone_errors() {
        let config = ClientConfig {
            google: Some(GoogleSettings {
                timezone: Some("Mars/Olympus".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.timezone().unwrap_err().contains("Mars/Olympus"));
    }

    #[test]
    fn overrides_create_google_section() {
        let mut config = ClientConfig::default();
        config.apply(Overrides {
            client_id: Some("cli.apps.googleusercontent.com".to_string()),
            gemini_api_key: Some("cli-gem".to_string()),
            ..Default::default()
        });

        let google = config.google().unwrap();
        assert_eq!(google.client_id.as_deref(), Some("cli.apps.googleusercontent.com"));
        assert_eq!(config.assistant.gemini_api_key.as_deref(), Some("cli-gem"));
    }

    #[test]
    fn overrides_keep_unset_fields() {
        let mut config = ClientConfig {
            google: Some(settings()),
            ..Default::default()
        };
        config.apply(Overrides {
            api_key: Some("fresh".to_string()),
            ..Default::default()
        });

        let google = config.google().unwrap();
        assert_eq!(google.api_key.as_deref(), Some("fresh"));
        assert_eq!(google.client_secret.as_deref(), Some("test-secret"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "debug = true\n[assistant]\nmodel = \"gemini-pro\"\n").unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert!(config.debug);
        assert_eq!(config.assistant.model, "gemini-pro");

        std::fs::write(&path, "debug = [").unwrap();
        assert!(ClientConfig::load_from(&path).unwrap_err().contains("parse"));
    }
}
