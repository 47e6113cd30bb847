//! SDK bundle loading.
//!
//! The session depends on two SDKs that load independently: the calendar
//! API client (GAPI) and the identity services client (GIS). Loading a
//! bundle fetches it from Google and attaches it to the manager's
//! [`SdkEnvironment`]; initializers only run against an attached SDK.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};

use super::config::GoogleConfig;

/// The two SDKs the session needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkKind {
    /// `api.js`, provides the discovery-driven calendar client.
    Calendar,
    /// `gsi/client`, provides the token client.
    Identity,
}

impl SdkKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Calendar => "GAPI",
            Self::Identity => "GIS",
        }
    }

    /// The user-facing message when this bundle cannot be fetched.
    pub fn load_error_message(self) -> String {
        format!("Failed to load {} script.", self.name())
    }
}

impl fmt::Display for SdkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bundle to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkBundle {
    pub kind: SdkKind,
    pub url: String,
}

/// An SDK that finished loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSdk {
    pub kind: SdkKind,
    pub source_url: String,
    pub size: usize,
}

impl SdkBundle {
    pub fn new(kind: SdkKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }

    /// The bundle for `kind` as configured.
    pub fn for_kind(kind: SdkKind, config: &GoogleConfig) -> Self {
        let url = match kind {
            SdkKind::Calendar => &config.gapi_bundle_url,
            SdkKind::Identity => &config.gis_bundle_url,
        };
        Self::new(kind, url.clone())
    }

    /// Fetches the bundle. Any network failure or non-2xx status is a
    /// [`ScriptLoad`](crate::ProviderErrorCode::ScriptLoad) error; there is
    /// no retry.
    pub async fn fetch(&self, http_client: &reqwest::Client) -> ProviderResult<LoadedSdk> {
        debug!(sdk = %self.kind, url = %self.url, "loading SDK bundle");

        let response = http_client.get(&self.url).send().await.map_err(|e| {
            warn!(sdk = %self.kind, error = %e, "SDK bundle request failed");
            ProviderError::script_load(self.kind.load_error_message()).with_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(sdk = %self.kind, status = status.as_u16(), "SDK bundle unavailable");
            return Err(ProviderError::script_load(self.kind.load_error_message())
                .with_status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            ProviderError::script_load(self.kind.load_error_message()).with_source(e)
        })?;

        Ok(LoadedSdk {
            kind: self.kind,
            source_url: self.url.clone(),
            size: body.len(),
        })
    }
}

/// SDKs attached to one session manager.
#[derive(Debug, Default, Clone)]
pub struct SdkEnvironment {
    calendar: Option<LoadedSdk>,
    identity: Option<LoadedSdk>,
}

impl SdkEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, sdk: LoadedSdk) {
        debug!(sdk = %sdk.kind, bytes = sdk.size, "SDK attached");
        match sdk.kind {
            SdkKind::Calendar => self.calendar = Some(sdk),
            SdkKind::Identity => self.identity = Some(sdk),
        }
    }

    pub fn get(&self, kind: SdkKind) -> Option<&LoadedSdk> {
        match kind {
            SdkKind::Calendar => self.calendar.as_ref(),
            SdkKind::Identity => self.identity.as_ref(),
        }
    }

    pub fn is_attached(&self, kind: SdkKind) -> bool {
        self.get(kind).is_some()
    }

    /// Removes every attached SDK.
    pub fn detach_all(&mut self) {
        self.calendar = None;
        self.identity = None;
    }
}
