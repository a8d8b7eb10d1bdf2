//! Dashboard: wires the session to the quote poller and the watchlist store.
//!
//! Session transitions are handled on the thread that delivers them:
//! - a newly signed-in identity stops the previous poller handle, binds the
//!   watchlist to the new session and starts polling; the backend user record and
//!   the watchlist are then fetched on a background thread;
//! - signing out stops polling and empties the watchlist before the listener
//!   returns.
//!
//! `view` combines the current feed and watchlist through the pure projection.
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::thread;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use market_common::listeners::lock;
use market_common::projection::{project, top_gainer};
use market_common::{ListenerId, Quote, Result, ViewFilter};

use crate::api::MarketApi;
use crate::auth::IdentityProvider;
use crate::config::ClientConfig;
use crate::poller::{FetchOutcome, PollHandle, QuoteFeed, QuotePoller};
use crate::session::{Session, SessionObserver};
use crate::watchlist::{ToggleOutcome, WatchlistStore};

/// Everything a front-end needs to draw one frame.
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    /// Rows matching the filter, in display order.
    pub rows: Vec<Quote>,
    /// Best performer of the whole snapshot.
    pub top_gainer: Option<String>,
    /// Completion time of the last successful fetch.
    pub last_updated: Option<DateTime<Utc>>,
    /// A fetch is in flight.
    pub refreshing: bool,
    /// The last fetch failed.
    pub stale: bool,
    /// Message of the last fetch failure.
    pub last_error: Option<String>,
    /// Starred symbols.
    pub watchlist: BTreeSet<String>,
    /// Symbols whose last watchlist change failed.
    pub failed: BTreeSet<String>,
}

#[derive(Default)]
struct ActiveSession {
    generation: u64,
    uid: Option<String>,
    handle: Option<Arc<PollHandle>>,
}

struct DashboardInner {
    api: Arc<dyn MarketApi>,
    poller: QuotePoller,
    watchlist: Arc<WatchlistStore>,
    active: Mutex<ActiveSession>,
}

impl DashboardInner {
    /// Decides the transition under `active`, then acts with the lock released so
    /// store listeners may call back into the dashboard.
    fn on_session(self: &Arc<Self>, session: &Session) {
        if session.is_loading {
            return;
        }
        let previous = {
            let mut active = lock(&self.active);
            if session.generation <= active.generation {
                return;
            }
            active.generation = session.generation;
            let uid = session.uid().map(String::from);
            if uid.is_some() && active.uid == uid {
                return;
            }
            active.uid = uid;
            active.handle.take()
        };
        if let Some(previous) = previous {
            self.poller.stop(&previous);
        }

        let Some(uid) = session.uid() else {
            self.watchlist.clear(session);
            return;
        };
        self.watchlist.attach(session);
        let handle = match self.poller.start(session) {
            Ok(handle) => Some(Arc::new(handle)),
            Err(e) => {
                warn!("Quote polling not started for {}: {}", uid, e);
                None
            }
        };
        if let Some(handle) = handle {
            let mut active = lock(&self.active);
            if active.generation != session.generation {
                drop(active);
                debug!("Session {} ended while starting its poller", session.generation);
                self.poller.stop(&handle);
                return;
            }
            active.handle = Some(handle);
        }

        let inner = Arc::clone(self);
        let session = session.clone();
        let spawned = thread::Builder::new()
            .name(String::from("session-bootstrap"))
            .spawn(move || inner.bootstrap(&session));
        if let Err(e) = spawned {
            error!("Failed to spawn session bootstrap: {}", e);
        }
    }

    fn bootstrap(&self, session: &Session) {
        if let Some(identity) = &session.identity {
            match identity.id_token().and_then(|token| self.api.ensure_user(&token)) {
                Ok(profile) => info!("Backend user record ready for {}", profile.uid),
                Err(e) => warn!("Could not ensure backend user for {}: {}", identity.uid(), e),
            }
        }
        self.watchlist.load(session);
    }
}

/// Session-aware stock dashboard.
pub struct Dashboard {
    session: SessionObserver,
    inner: Arc<DashboardInner>,
    session_listener: ListenerId,
}

impl Dashboard {
    /// Observe `provider` and keep quotes and watchlist in step with it.
    pub fn start(
        provider: Arc<dyn IdentityProvider>,
        api: Arc<dyn MarketApi>,
        config: &ClientConfig,
    ) -> Self {
        let inner = Arc::new(DashboardInner {
            poller: QuotePoller::new(Arc::clone(&api), config.poller()),
            watchlist: Arc::new(WatchlistStore::new(Arc::clone(&api))),
            api,
            active: Mutex::new(ActiveSession::default()),
        });
        let session = SessionObserver::new(provider);
        let for_session = Arc::clone(&inner);
        let session_listener = session.observe(move |s| for_session.on_session(s));

        Dashboard {
            session,
            inner,
            session_listener,
        }
    }

    /// Latest session.
    pub fn session(&self) -> Session {
        self.session.current()
    }

    /// Session observer, for front-ends that want their own listener.
    pub fn session_observer(&self) -> &SessionObserver {
        &self.session
    }

    /// Current quote feed.
    pub fn feed(&self) -> QuoteFeed {
        self.inner.poller.feed()
    }

    /// Register a callback for every feed change.
    pub fn on_feed(&self, listener: impl Fn(&QuoteFeed) + Send + Sync + 'static) -> ListenerId {
        self.inner.poller.subscribe(listener)
    }

    /// Watchlist store of the current session.
    pub fn watchlist(&self) -> &Arc<WatchlistStore> {
        &self.inner.watchlist
    }

    /// Star or unstar `symbol`. See `WatchlistStore::toggle`.
    pub fn toggle(&self, symbol: &str) -> ToggleOutcome {
        self.inner.watchlist.toggle(symbol)
    }

    /// Fetch quotes now, joining a fetch already in flight.
    pub fn refresh_now(&self) -> FetchOutcome {
        let handle = lock(&self.inner.active).handle.clone();
        match handle {
            Some(handle) => self.inner.poller.refresh_now(&handle),
            None => FetchOutcome::Stopped,
        }
    }

    /// Project the current state through `filter`.
    pub fn view(&self, filter: &ViewFilter) -> DashboardView {
        let feed = self.inner.poller.feed();
        let watch = self.inner.watchlist.snapshot();
        let rows = project(&feed.quotes, &watch.symbols, filter)
            .into_iter()
            .cloned()
            .collect();

        DashboardView {
            rows,
            top_gainer: top_gainer(&feed.quotes).map(String::from),
            last_updated: feed.last_updated,
            refreshing: feed.refreshing,
            stale: feed.stale,
            last_error: feed.last_error,
            watchlist: watch.symbols,
            failed: watch.failed.into_keys().collect(),
        }
    }

    /// End the session through the identity provider.
    pub fn sign_out(&self) -> Result<()> {
        self.session.sign_out()
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.session.unobserve(self.session_listener);
        if let Some(handle) = lock(&self.inner.active).handle.take() {
            self.inner.poller.stop(&handle);
        }
    }
}
