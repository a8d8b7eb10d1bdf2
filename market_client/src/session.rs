//! Session observer.
//!
//! Wraps an `IdentityProvider` subscription and republishes it as a `Session`
//! value: who is signed in, whether the provider has resolved yet, and a generation
//! counter that increases on every delivered change. Provider errors fail closed to
//! "nobody signed in". The provider subscription lives exactly as long as the
//! `SessionObserver`.
use std::fmt;
use std::sync::{Arc, Mutex};

use log::{info, warn};
use market_common::listeners::lock;
use market_common::{ListenerId, Listeners, Result};

use crate::auth::{AuthState, Identity, IdentityProvider};

/// Authentication state as seen by the rest of the client.
#[derive(Clone)]
pub struct Session {
    /// Signed-in identity, if any.
    pub identity: Option<Arc<dyn Identity>>,
    /// `true` until the provider reports its first state.
    pub is_loading: bool,
    /// Increases by one on every delivered change.
    pub generation: u64,
}

impl Session {
    fn loading() -> Self {
        Session {
            identity: None,
            is_loading: true,
            generation: 0,
        }
    }

    /// Stable user id of the signed-in identity.
    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid())
    }

    /// `true` when an identity is present.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid())
            .field("is_loading", &self.is_loading)
            .field("generation", &self.generation)
            .finish()
    }
}

struct SessionShared {
    current: Mutex<Session>,
    listeners: Listeners<Session>,
}

impl SessionShared {
    fn apply(&self, state: &AuthState) {
        let identity = match state {
            Ok(identity) => identity.clone(),
            Err(e) => {
                warn!("Identity provider error, treating as signed out: {}", e);
                None
            }
        };

        let next = {
            let mut current = lock(&self.current);
            let unchanged = !current.is_loading
                && current.uid() == identity.as_ref().map(|i| i.uid());
            if unchanged {
                return;
            }
            *current = Session {
                identity,
                is_loading: false,
                generation: current.generation + 1,
            };
            current.clone()
        };

        match next.uid() {
            Some(uid) => info!("Session {} signed in as {}", next.generation, uid),
            None => info!("Session {} signed out", next.generation),
        }
        self.listeners.notify(&next);
    }
}

/// Republishes provider auth changes as `Session` values.
pub struct SessionObserver {
    provider: Arc<dyn IdentityProvider>,
    shared: Arc<SessionShared>,
    provider_listener: ListenerId,
}

impl SessionObserver {
    /// Subscribe to `provider`. The subscription is removed when the observer drops.
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let shared = Arc::new(SessionShared {
            current: Mutex::new(Session::loading()),
            listeners: Listeners::new(),
        });
        let for_provider = Arc::clone(&shared);
        let provider_listener =
            provider.on_auth_state_changed(Box::new(move |state| for_provider.apply(state)));

        SessionObserver {
            provider,
            shared,
            provider_listener,
        }
    }

    /// Latest session.
    pub fn current(&self) -> Session {
        lock(&self.shared.current).clone()
    }

    /// Register `on_change`. It is called with the current session right away and
    /// then once per change. Listeners must ignore a session whose generation is
    /// older than one they have already seen.
    pub fn observe(&self, on_change: impl Fn(&Session) + Send + Sync + 'static) -> ListenerId {
        let id = self.shared.listeners.subscribe(on_change);
        let current = self.current();
        self.shared.listeners.notify_one(id, &current);
        id
    }

    /// Remove a listener added with `observe`.
    pub fn unobserve(&self, id: ListenerId) {
        self.shared.listeners.unsubscribe(id);
    }

    /// Ask the provider to end the session.
    pub fn sign_out(&self) -> Result<()> {
        self.provider.sign_out()
    }
}

impl Drop for SessionObserver {
    fn drop(&mut self) {
        self.provider.remove_listener(self.provider_listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticIdentityProvider;
    use crate::testing::FakeIdentity;

    fn record(observer: &SessionObserver) -> Arc<Mutex<Vec<(Option<String>, bool, u64)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        observer.observe(move |s| {
            seen_clone
                .lock()
                .unwrap()
                .push((s.uid().map(String::from), s.is_loading, s.generation));
        });
        seen
    }

    #[test]
    fn delivers_loading_then_resolved_identity() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let observer = SessionObserver::new(provider.clone());
        let seen = record(&observer);

        provider.sign_in(FakeIdentity::arc("alice"));

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![(None, true, 0), (Some("alice".to_string()), false, 1)]
        );
    }

    #[test]
    fn suppresses_duplicate_deliveries() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let observer = SessionObserver::new(provider.clone());
        let seen = record(&observer);

        provider.sign_in(FakeIdentity::arc("alice"));
        provider.sign_in(FakeIdentity::arc("alice"));
        provider.sign_out().unwrap();
        provider.sign_out().unwrap();
        provider.sign_in(FakeIdentity::arc("bob"));

        let uids: Vec<Option<String>> = seen.lock().unwrap().iter().map(|e| e.0.clone()).collect();
        assert_eq!(uids, vec![None, Some("alice".into()), None, Some("bob".into())]);
        assert_eq!(observer.current().generation, 3);
    }

    #[test]
    fn provider_error_fails_closed() {
        let provider = Arc::new(StaticIdentityProvider::signed_in(FakeIdentity::arc("alice")));
        let observer = SessionObserver::new(provider.clone());
        assert_eq!(observer.current().uid(), Some("alice"));

        provider.fail("token endpoint unreachable");
        let session = observer.current();
        assert!(!session.is_authenticated());
        assert!(!session.is_loading);
    }

    #[test]
    fn error_before_resolution_resolves_to_signed_out() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let observer = SessionObserver::new(provider.clone());
        provider.fail("boom");
        let session = observer.current();
        assert!(!session.is_loading);
        assert_eq!(session.generation, 1);
    }

    #[test]
    fn drop_unsubscribes_from_provider() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let observer = SessionObserver::new(provider.clone());
        let seen = record(&observer);
        drop(observer);

        provider.sign_in(FakeIdentity::arc("alice"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unobserve_stops_delivery() {
        let provider = Arc::new(StaticIdentityProvider::new());
        let observer = SessionObserver::new(provider.clone());
        let seen = Arc::new(Mutex::new(0));
        let seen_clone = seen.clone();
        let id = observer.observe(move |_| *seen_clone.lock().unwrap() += 1);
        observer.unobserve(id);

        provider.sign_in(FakeIdentity::arc("alice"));
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
