//! Session lifecycle manager.
//!
//! [`SessionManager::mount`] starts one load task per SDK. Tasks and consent
//! callbacks never touch state directly: they send [`SessionEvent`]s to a
//! single pump task, which applies them to the [`SessionState`] and
//! publishes a [`SessionSnapshot`] on a watch channel.
//!
//! ```text
//! Loading ──both capabilities ready──▶ Ready
//!    │
//!    └────any load error──────────────▶ Failed (terminal)
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{RwLock, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::calendar::CalendarApi;
use crate::error::{ProviderError, ProviderResult};

use super::config::GoogleConfig;
use super::discovery::initialize_calendar_client;
use super::loader::{SdkBundle, SdkEnvironment, SdkKind};
use super::store::SessionStore;
use super::token_client::{
    ConsentFlow, ErrorCallback, GrantError, GrantErrorKind, Prompt, TokenCallback, TokenClient,
    TokenResponse, initialize_token_client, revoke_token,
};

/// Shown when sign-in is requested before the token client exists.
pub const SIGN_IN_NOT_READY: &str =
    "Authentication service not ready. Please wait a moment and try again.";

const ACCESS_DENIED: &str = "Authentication failed or access denied.";

/// Progress of the two SDK capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadState {
    pub gapi_loaded: bool,
    pub gis_loaded: bool,
    /// First load error; once set the session is failed for good.
    pub error: Option<String>,
    /// Non-fatal notice while the identity SDK is not ready yet.
    pub advisory: Option<String>,
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        !(self.gapi_loaded && self.gis_loaded) && self.error.is_none()
    }

    pub fn status(&self) -> LoadStatus {
        if self.error.is_some() {
            LoadStatus::Failed
        } else if self.gapi_loaded && self.gis_loaded {
            LoadStatus::Ready
        } else {
            LoadStatus::Loading
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed,
}

/// Messages consumed by the pump.
pub enum SessionEvent {
    /// A load-phase failure: bundle fetch or either initializer.
    LoadFailed(String),
    /// The identity SDK is not usable yet.
    IdentityPending(String),
    CalendarReady(Arc<dyn CalendarApi>),
    IdentityReady(Arc<TokenClient>),
    TokenGranted(TokenResponse),
    GrantFailed(GrantError),
    /// Sign-in was attempted without a token client.
    SignInUnavailable,
    SignedOut,
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadFailed(m) => f.debug_tuple("LoadFailed").field(m).finish(),
            Self::IdentityPending(m) => f.debug_tuple("IdentityPending").field(m).finish(),
            Self::CalendarReady(_) => f.write_str("CalendarReady"),
            Self::IdentityReady(_) => f.write_str("IdentityReady"),
            Self::TokenGranted(r) => f
                .debug_struct("TokenGranted")
                .field("has_token", &r.has_token())
                .field("error", &r.error)
                .finish(),
            Self::GrantFailed(e) => f.debug_tuple("GrantFailed").field(e).finish(),
            Self::SignInUnavailable => f.write_str("SignInUnavailable"),
            Self::SignedOut => f.write_str("SignedOut"),
        }
    }
}

/// What observers see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub load: LoadState,
    pub is_signed_in: bool,
    /// Latest sign-in failure; kept apart from the load error.
    pub auth_error: Option<String>,
}

impl SessionSnapshot {
    pub fn status(&self) -> LoadStatus {
        self.load.status()
    }

    pub fn is_loading(&self) -> bool {
        self.load.is_loading()
    }
}

/// Aggregate session state. Only the pump mutates it.
#[derive(Default)]
pub struct SessionState {
    load: LoadState,
    signed_in: bool,
    auth_error: Option<String>,
    calendar: Option<Arc<dyn CalendarApi>>,
    token_client: Option<Arc<TokenClient>>,
    /// Token granted before the calendar capability existed.
    pending_token: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> LoadStatus {
        self.load.status()
    }

    pub fn calendar(&self) -> Option<Arc<dyn CalendarApi>> {
        self.calendar.clone()
    }

    pub fn token_client(&self) -> Option<Arc<TokenClient>> {
        self.token_client.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            load: self.load.clone(),
            is_signed_in: self.signed_in,
            auth_error: self.auth_error.clone(),
        }
    }

    pub fn apply(&mut self, event: SessionEvent) {
        let failed = self.status() == LoadStatus::Failed;
        match event {
            SessionEvent::LoadFailed(message) => {
                if failed {
                    debug!(%message, "additional load error ignored");
                } else {
                    error!(%message, "session failed to load");
                    self.load.error = Some(message);
                }
            }
            // Only a token client that is already in place makes the
            // notice stale. Nothing retries initialization after it.
            SessionEvent::IdentityPending(message) => {
                if !self.load.gis_loaded {
                    self.load.advisory = Some(message);
                }
            }
            SessionEvent::CalendarReady(calendar) => {
                if failed {
                    debug!("calendar capability arrived after failure; dropped");
                    return;
                }
                if let Some(token) = self.pending_token.take() {
                    calendar.set_token(Some(token));
                }
                self.calendar = Some(calendar);
                self.load.gapi_loaded = true;
            }
            SessionEvent::IdentityReady(client) => {
                if failed {
                    debug!("token client arrived after failure; dropped");
                    return;
                }
                self.token_client = Some(client);
                self.load.gis_loaded = true;
                self.load.advisory = None;
            }
            SessionEvent::TokenGranted(response) => {
                if response.has_token() {
                    info!("authentication successful");
                    match &self.calendar {
                        Some(calendar) => calendar.set_token(Some(response.access_token)),
                        None => self.pending_token = Some(response.access_token),
                    }
                    self.signed_in = true;
                    self.auth_error = None;
                } else {
                    warn!(error = ?response.error, "token response without access token");
                    self.signed_in = false;
                    self.auth_error = Some(ACCESS_DENIED.to_string());
                }
            }
            SessionEvent::GrantFailed(grant_error) => {
                self.signed_in = false;
                if grant_error.kind != GrantErrorKind::PopupClosed {
                    self.auth_error = Some(format!("Authentication error: {}", grant_error.kind));
                }
            }
            SessionEvent::SignInUnavailable => {
                self.auth_error = Some(SIGN_IN_NOT_READY.to_string());
            }
            SessionEvent::SignedOut => {
                if let Some(calendar) = &self.calendar {
                    calendar.set_token(None);
                }
                self.pending_token = None;
                self.signed_in = false;
            }
        }
    }
}

enum Envelope {
    Event(SessionEvent),
    /// Acknowledged once every earlier envelope has been applied.
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
struct EventSender(mpsc::UnboundedSender<Envelope>);

impl EventSender {
    fn send(&self, event: SessionEvent) {
        if self.0.send(Envelope::Event(event)).is_err() {
            debug!("session unmounted; event dropped");
        }
    }
}

/// Owns the SDK environment, the session state and the pump task.
pub struct SessionManager {
    config: Arc<GoogleConfig>,
    http_client: reqwest::Client,
    store: SessionStore,
    env: Arc<Mutex<SdkEnvironment>>,
    state: Arc<RwLock<SessionState>>,
    events: EventSender,
    snapshots: watch::Receiver<SessionSnapshot>,
    pump: JoinHandle<()>,
}

impl SessionManager {
    /// Starts the pump and both SDK load tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount(
        config: GoogleConfig,
        consent: Arc<dyn ConsentFlow>,
        store: SessionStore,
    ) -> ProviderResult<Self> {
        let http_client = config.http_client().map_err(|e| {
            ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                .with_source(e)
        })?;
        let config = Arc::new(config);

        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(SessionSnapshot::default());
        let state = Arc::new(RwLock::new(SessionState::new()));
        let env = Arc::new(Mutex::new(SdkEnvironment::new()));
        let events = EventSender(tx);

        let pump = tokio::spawn(run_pump(rx, Arc::clone(&state), snapshot_tx));

        tokio::spawn(load_calendar(
            http_client.clone(),
            Arc::clone(&config),
            Arc::clone(&env),
            events.clone(),
        ));
        tokio::spawn(load_identity(
            http_client.clone(),
            Arc::clone(&config),
            Arc::clone(&env),
            consent,
            events.clone(),
        ));

        info!("session manager mounted");
        Ok(Self {
            config,
            http_client,
            store,
            env,
            state,
            events,
            snapshots,
            pump,
        })
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Waits until the session leaves `Loading`.
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| !s.is_loading()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Resolves once every event sent so far has been applied.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.events.0.send(Envelope::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    pub async fn calendar(&self) -> Option<Arc<dyn CalendarApi>> {
        self.state.read().await.calendar()
    }

    pub async fn token_client(&self) -> Option<Arc<TokenClient>> {
        self.state.read().await.token_client()
    }

    pub fn is_attached(&self, kind: SdkKind) -> bool {
        self.env
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_attached(kind)
    }

    /// Runs the consent flow and waits until its outcome is applied.
    ///
    /// Without a token client the attempt is recorded as an auth error and
    /// [`SIGN_IN_NOT_READY`] is returned.
    pub async fn sign_in(&self) -> ProviderResult<SessionSnapshot> {
        let Some(client) = self.token_client().await else {
            warn!("sign-in requested before token client was initialized");
            self.events.send(SessionEvent::SignInUnavailable);
            self.flush().await;
            return Err(ProviderError::auth_init(SIGN_IN_NOT_READY));
        };

        client
            .request_access_token(Prompt::Consent)
            .await
            .map_err(|e| ProviderError::internal("consent task failed").with_source(e))?;
        self.flush().await;
        Ok(self.snapshot())
    }

    /// Revokes the current token and signs out.
    ///
    /// The token comes from the calendar capability, or from the store when
    /// the session was established through the redirect grant. A failed
    /// revocation is logged; local sign-out happens regardless.
    pub async fn sign_out(&self) -> ProviderResult<()> {
        let token = match self.calendar().await.and_then(|c| c.token()) {
            Some(token) => Some(token),
            None => self.store.token()?.map(|t| t.access_token),
        };

        if let Some(token) = token {
            if let Err(e) = revoke_token(&self.http_client, &self.config.revoke_url, &token).await
            {
                warn!(error = %e, "token revocation failed");
            }
        } else {
            debug!("no token to revoke");
        }

        self.store.clear_token()?;
        self.events.send(SessionEvent::SignedOut);
        self.flush().await;
        Ok(())
    }

    /// Stops the pump and detaches both SDKs. Load tasks still in flight
    /// finish on their own; their events are dropped.
    pub fn unmount(self) {
        drop(self);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.pump.abort();
        self.env
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detach_all();
        debug!("session manager unmounted");
    }
}

async fn run_pump(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    state: Arc<RwLock<SessionState>>,
    snapshots: watch::Sender<SessionSnapshot>,
) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Event(event) => {
                debug!(?event, "applying session event");
                let snapshot = {
                    let mut state = state.write().await;
                    state.apply(event);
                    state.snapshot()
                };
                snapshots.send_if_modified(|current| {
                    if *current == snapshot {
                        false
                    } else {
                        *current = snapshot;
                        true
                    }
                });
            }
            Envelope::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

fn attach(env: &Mutex<SdkEnvironment>, sdk: super::loader::LoadedSdk) {
    env.lock().unwrap_or_else(PoisonError::into_inner).attach(sdk);
}

async fn load_calendar(
    http_client: reqwest::Client,
    config: Arc<GoogleConfig>,
    env: Arc<Mutex<SdkEnvironment>>,
    events: EventSender,
) {
    let bundle = SdkBundle::for_kind(SdkKind::Calendar, &config);
    match bundle.fetch(&http_client).await {
        Ok(sdk) => attach(&env, sdk),
        Err(e) => {
            events.send(SessionEvent::LoadFailed(e.message().to_string()));
            return;
        }
    }

    match initialize_calendar_client(http_client, &config).await {
        Ok(client) => events.send(SessionEvent::CalendarReady(Arc::new(client))),
        Err(e) => events.send(SessionEvent::LoadFailed(format!(
            "GAPI Init Failed: {}",
            e.message()
        ))),
    }
}

async fn load_identity(
    http_client: reqwest::Client,
    config: Arc<GoogleConfig>,
    env: Arc<Mutex<SdkEnvironment>>,
    consent: Arc<dyn ConsentFlow>,
    events: EventSender,
) {
    let bundle = SdkBundle::for_kind(SdkKind::Identity, &config);
    match bundle.fetch(&http_client).await {
        Ok(sdk) => attach(&env, sdk),
        Err(e) => {
            events.send(SessionEvent::LoadFailed(e.message().to_string()));
            return;
        }
    }

    let on_token: TokenCallback = {
        let events = events.clone();
        Arc::new(move |response: TokenResponse| events.send(SessionEvent::TokenGranted(response)))
    };
    let on_error: ErrorCallback = {
        let events = events.clone();
        Arc::new(move |grant_error: GrantError| events.send(SessionEvent::GrantFailed(grant_error)))
    };

    // The identity SDK was attached just above, so the advisory arm below is
    // reachable only if the manager was unmounted in between; its event is
    // then dropped with the closed channel.
    let initialized = {
        let env = env.lock().unwrap_or_else(PoisonError::into_inner);
        initialize_token_client(&env, &config, consent, on_token, on_error)
    };

    match initialized {
        Ok(client) => events.send(SessionEvent::IdentityReady(Arc::new(client))),
        Err(e) if e.code().is_advisory() => {
            events.send(SessionEvent::IdentityPending(e.message().to_string()))
        }
        Err(e) => events.send(SessionEvent::LoadFailed(format!(
            "Failed to initialize Google Sign-In: {}",
            e.message()
        ))),
    }
}
