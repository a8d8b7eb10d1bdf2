//! Identity provider seam.
//!
//! The client never talks to an identity backend directly. It receives an
//! `IdentityProvider` at construction time and only relies on three things: a
//! subscribe-to-changes primitive, a sign-out entry point, and, for each signed-in
//! `Identity`, an on-demand bearer credential mint.
//!
//! `StaticIdentityProvider` is an in-process provider whose state is driven by
//! explicit `sign_in`/`sign_out`/`fail` calls. The terminal front-end pairs it with
//! `TokenFileIdentity`, which re-reads its token file on every mint so rotated
//! credentials are picked up without a restart.
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use market_common::listeners::lock;
use market_common::{ListenerId, Listeners, MarketError, Result};

/// An authenticated end user.
pub trait Identity: Send + Sync + fmt::Debug {
    /// Opaque, stable user id.
    fn uid(&self) -> &str;

    /// Human-readable name, if the provider knows one.
    fn display_name(&self) -> Option<&str> {
        None
    }

    /// Mint a short-lived bearer credential. Called once per remote request; the
    /// result must not be cached by callers.
    fn id_token(&self) -> Result<String>;
}

/// Value delivered to auth-state listeners: the signed-in identity, nobody, or a
/// provider failure.
pub type AuthState = Result<Option<Arc<dyn Identity>>>;

/// Callback registered with an `IdentityProvider`.
pub type AuthListener = Box<dyn Fn(&AuthState) + Send + Sync>;

/// Source of authentication state.
pub trait IdentityProvider: Send + Sync {
    /// Register `listener`. If the provider has already resolved, the listener is
    /// called with the current state right away; afterwards on every change.
    fn on_auth_state_changed(&self, listener: AuthListener) -> ListenerId;

    /// Remove a listener registered with `on_auth_state_changed`.
    fn remove_listener(&self, id: ListenerId);

    /// End the current user's session.
    fn sign_out(&self) -> Result<()>;
}

#[derive(Clone)]
enum ProviderState {
    Pending,
    Resolved(Option<Arc<dyn Identity>>),
    Failed(String),
}

impl ProviderState {
    fn to_auth_state(&self) -> Option<AuthState> {
        match self {
            ProviderState::Pending => None,
            ProviderState::Resolved(identity) => Some(Ok(identity.clone())),
            ProviderState::Failed(msg) => Some(Err(MarketError::Auth(msg.clone()))),
        }
    }
}

/// In-process identity provider driven by explicit calls.
pub struct StaticIdentityProvider {
    state: Mutex<ProviderState>,
    listeners: Listeners<AuthState>,
}

impl StaticIdentityProvider {
    /// Provider that has not resolved yet; listeners receive nothing until the
    /// first `sign_in`, `sign_out` or `fail`.
    pub fn new() -> Self {
        StaticIdentityProvider {
            state: Mutex::new(ProviderState::Pending),
            listeners: Listeners::new(),
        }
    }

    /// Provider already resolved to `identity`.
    pub fn signed_in(identity: Arc<dyn Identity>) -> Self {
        let provider = Self::new();
        *lock(&provider.state) = ProviderState::Resolved(Some(identity));
        provider
    }

    /// Switch to `identity` and notify listeners.
    pub fn sign_in(&self, identity: Arc<dyn Identity>) {
        info!("Signing in as {}", identity.uid());
        self.transition(ProviderState::Resolved(Some(identity)));
    }

    /// Report a provider failure to listeners.
    pub fn fail(&self, message: &str) {
        warn!("Identity provider failure: {}", message);
        self.transition(ProviderState::Failed(String::from(message)));
    }

    fn transition(&self, next: ProviderState) {
        let state = {
            let mut current = lock(&self.state);
            *current = next;
            current.to_auth_state()
        };
        if let Some(state) = state {
            self.listeners.notify(&state);
        }
    }
}

impl Default for StaticIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn on_auth_state_changed(&self, listener: AuthListener) -> ListenerId {
        let id = self.listeners.subscribe(move |state| listener(state));
        let current = lock(&self.state).to_auth_state();
        if let Some(state) = current {
            self.listeners.notify_one(id, &state);
        }
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }

    fn sign_out(&self) -> Result<()> {
        info!("Signing out");
        self.transition(ProviderState::Resolved(None));
        Ok(())
    }
}

/// Identity whose bearer credential is read from a file on every mint.
#[derive(Debug, Clone)]
pub struct TokenFileIdentity {
    uid: String,
    display_name: Option<String>,
    path: PathBuf,
}

impl TokenFileIdentity {
    /// Identity `uid` whose credential lives at `path`.
    pub fn new(uid: &str, path: PathBuf) -> Self {
        TokenFileIdentity {
            uid: String::from(uid),
            display_name: None,
            path,
        }
    }

    /// Attach a display name.
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(String::from(name));
        self
    }
}

impl Identity for TokenFileIdentity {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    fn id_token(&self) -> Result<String> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| MarketError::Auth(format!("read {}: {}", self.path.display(), e)))?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(MarketError::Auth(format!("token file {} is empty", self.path.display())));
        }
        debug!("Minted credential for {} from {}", self.uid, self.path.display());
        Ok(String::from(token))
    }
}
