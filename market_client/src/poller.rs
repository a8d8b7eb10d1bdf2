//! Quote poller.
//!
//! `QuotePoller` keeps the latest stock snapshot fresh while a session is live.
//! Each `start` spawns one worker thread bound to a `PollHandle`; the worker fetches,
//! publishes the result, and only then waits for the next tick, a manual refresh, or
//! a stop signal:
//!
//! ```text
//! fetch -> settle -> select! { stop | refresh | default(interval) } -> fetch ...
//! ```
//!
//! Guarantees:
//! - the interval is measured from the end of one fetch to the start of the next, so
//!   two fetches of the same handle never overlap;
//! - every fetch mints a new bearer credential;
//! - a failed fetch keeps the last good snapshot and marks the feed stale;
//! - concurrent `refresh_now` calls coalesce onto the in-flight (or next) fetch;
//! - once a handle is stopped or superseded, nothing it fetched is applied.
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use market_common::listeners::lock;
use market_common::quote::unique_by_symbol;
use market_common::{ListenerId, Listeners, MarketError, Quote, Result};

use crate::api::MarketApi;
use crate::auth::Identity;
use crate::session::Session;

/// Poller tuning.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Delay between the end of one fetch and the start of the next.
    pub interval: Duration,
}

/// What consumers see of the quote stream.
#[derive(Debug, Clone, Default)]
pub struct QuoteFeed {
    /// Last good snapshot. Replaced wholesale on every successful fetch.
    pub quotes: Arc<Vec<Quote>>,
    /// Completion time of the last successful fetch.
    pub last_updated: Option<DateTime<Utc>>,
    /// A fetch is in flight.
    pub refreshing: bool,
    /// The most recent fetch failed; `quotes` is older than it should be.
    pub stale: bool,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

/// Result of a single fetch as reported to `refresh_now`.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Snapshot replaced.
    Updated {
        /// Rows in the new snapshot.
        count: usize,
        /// Completion time.
        at: DateTime<Utc>,
    },
    /// Fetch failed; the previous snapshot stays visible.
    Failed(String),
    /// The handle was stopped or superseded before a result was available.
    Stopped,
}

struct PollState {
    feed: QuoteFeed,
    active: Option<u64>,
    generation: u64,
    next_handle: u64,
    fetch_seq: u64,
    in_flight: Option<u64>,
    last_settled: u64,
    refresh_requested: bool,
    last_outcome: Option<FetchOutcome>,
}

struct PollShared {
    state: Mutex<PollState>,
    settled: Condvar,
    listeners: Listeners<QuoteFeed>,
}

impl PollShared {
    fn deactivate(&self, id: u64) {
        let cleared = {
            let mut st = lock(&self.state);
            if st.active == Some(id) {
                st.active = None;
                st.feed = QuoteFeed::default();
                st.in_flight = None;
                st.refresh_requested = false;
                st.last_outcome = None;
                true
            } else {
                false
            }
        };
        self.settled.notify_all();
        if cleared {
            self.listeners.notify(&QuoteFeed::default());
        }
    }
}

/// Owns the quote feed and the worker threads that refresh it.
pub struct QuotePoller {
    api: Arc<dyn MarketApi>,
    config: PollerConfig,
    shared: Arc<PollShared>,
}

/// Ties a running worker to one session. Dropping it stops the worker.
pub struct PollHandle {
    id: u64,
    uid: String,
    refresh_tx: Sender<()>,
    stop_tx: Sender<()>,
    shared: Arc<PollShared>,
}

impl PollHandle {
    /// Handle number, unique per poller.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// User the worker fetches for.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    fn halt(&self) {
        self.shared.deactivate(self.id);
        let _ = self.stop_tx.try_send(());
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

impl QuotePoller {
    /// Create an idle poller.
    pub fn new(api: Arc<dyn MarketApi>, config: PollerConfig) -> Self {
        QuotePoller {
            api,
            config,
            shared: Arc::new(PollShared {
                state: Mutex::new(PollState {
                    feed: QuoteFeed::default(),
                    active: None,
                    generation: 0,
                    next_handle: 1,
                    fetch_seq: 0,
                    in_flight: None,
                    last_settled: 0,
                    refresh_requested: false,
                    last_outcome: None,
                }),
                settled: Condvar::new(),
                listeners: Listeners::new(),
            }),
        }
    }

    /// Start polling for `session`. Fails if nobody is signed in, or if a handle
    /// was already started for a newer session.
    ///
    /// The first fetch starts immediately. A previously started handle is
    /// superseded: its worker exits and its results are ignored.
    pub fn start(&self, session: &Session) -> Result<PollHandle> {
        let identity = session.identity.clone().ok_or(MarketError::NotAuthenticated)?;
        let uid = String::from(identity.uid());
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (refresh_tx, refresh_rx) = unbounded::<()>();

        let id = {
            let mut st = lock(&self.shared.state);
            if session.generation < st.generation {
                return Err(MarketError::SupersededSession {
                    generation: session.generation,
                    current: st.generation,
                });
            }
            st.generation = session.generation;
            let id = st.next_handle;
            st.next_handle += 1;
            if let Some(previous) = st.active {
                info!("Quote poller {} superseded by {}", previous, id);
            }
            st.active = Some(id);
            st.feed = QuoteFeed::default();
            st.in_flight = None;
            st.refresh_requested = false;
            st.last_outcome = None;
            id
        };
        self.shared.settled.notify_all();
        self.shared.listeners.notify(&QuoteFeed::default());

        let handle = PollHandle {
            id,
            uid: uid.clone(),
            refresh_tx,
            stop_tx,
            shared: Arc::clone(&self.shared),
        };

        let worker = Worker {
            id,
            api: Arc::clone(&self.api),
            identity,
            shared: Arc::clone(&self.shared),
            interval: self.config.interval,
        };
        thread::Builder::new()
            .name(format!("quote-poller-{}", id))
            .spawn(move || worker.run(stop_rx, refresh_rx))?;

        info!("Quote poller {} started for {} every {:?}", id, uid, self.config.interval);
        Ok(handle)
    }

    /// Stop polling. Any fetch still in flight for `handle` is discarded.
    /// Dropping the handle has the same effect.
    pub fn stop(&self, handle: &PollHandle) {
        if self.is_active(handle) {
            info!("Stopping quote poller {} for {}", handle.id, handle.uid);
        }
        handle.halt();
    }

    /// Fetch now and wait for the result.
    ///
    /// If a fetch is already in flight for `handle`, no new one is started; the
    /// caller waits for and receives the in-flight result.
    pub fn refresh_now(&self, handle: &PollHandle) -> FetchOutcome {
        let mut st = lock(&self.shared.state);
        if st.active != Some(handle.id) {
            return FetchOutcome::Stopped;
        }

        let target = match st.in_flight {
            Some(seq) => {
                debug!("Refresh joins in-flight fetch {}", seq);
                seq
            }
            None => {
                if !st.refresh_requested {
                    st.refresh_requested = true;
                    if handle.refresh_tx.send(()).is_err() {
                        return FetchOutcome::Stopped;
                    }
                }
                st.fetch_seq + 1
            }
        };

        while st.active == Some(handle.id) && st.last_settled < target {
            st = self
                .shared
                .settled
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if st.active != Some(handle.id) {
            return FetchOutcome::Stopped;
        }
        st.last_outcome.clone().unwrap_or(FetchOutcome::Stopped)
    }

    /// `true` while `handle` is the poller's current handle.
    pub fn is_active(&self, handle: &PollHandle) -> bool {
        lock(&self.shared.state).active == Some(handle.id)
    }

    /// Current feed.
    pub fn feed(&self) -> QuoteFeed {
        lock(&self.shared.state).feed.clone()
    }

    /// Register a callback for every feed change.
    pub fn subscribe(&self, listener: impl Fn(&QuoteFeed) + Send + Sync + 'static) -> ListenerId {
        self.shared.listeners.subscribe(listener)
    }

    /// Remove a callback added with `subscribe`.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.shared.listeners.unsubscribe(id);
    }
}

struct Worker {
    id: u64,
    api: Arc<dyn MarketApi>,
    identity: Arc<dyn Identity>,
    shared: Arc<PollShared>,
    interval: Duration,
}

impl Worker {
    fn run(self, stop_rx: Receiver<()>, refresh_rx: Receiver<()>) {
        loop {
            if !self.fetch_once(&refresh_rx) {
                break;
            }
            select! {
                recv(stop_rx) -> _ => break,
                recv(refresh_rx) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                    debug!("Quote poller {}: manual refresh", self.id);
                },
                default(self.interval) => {},
            }
        }
        info!("Quote poller {} stopped", self.id);
    }

    /// Run one fetch. Returns `false` once the handle is no longer active.
    fn fetch_once(&self, refresh_rx: &Receiver<()>) -> bool {
        let (seq, feed) = {
            let mut st = lock(&self.shared.state);
            if st.active != Some(self.id) {
                return false;
            }
            st.fetch_seq += 1;
            let seq = st.fetch_seq;
            st.in_flight = Some(seq);
            st.refresh_requested = false;
            while refresh_rx.try_recv().is_ok() {}
            st.feed.refreshing = true;
            (seq, st.feed.clone())
        };
        self.shared.listeners.notify(&feed);

        debug!("Quote poller {}: fetch {} started", self.id, seq);
        let result = self
            .identity
            .id_token()
            .and_then(|token| self.api.fetch_stocks(&token));

        let feed = {
            let mut st = lock(&self.shared.state);
            if st.active != Some(self.id) {
                debug!("Quote poller {}: discarding fetch {} after stop", self.id, seq);
                return false;
            }
            st.in_flight = None;
            st.last_settled = seq;
            st.feed.refreshing = false;
            let outcome = match result {
                Ok(quotes) => {
                    let quotes = unique_by_symbol(quotes);
                    let at = Utc::now();
                    let count = quotes.len();
                    st.feed.quotes = Arc::new(quotes);
                    st.feed.last_updated = Some(at);
                    st.feed.stale = false;
                    st.feed.last_error = None;
                    debug!("Quote poller {}: fetch {} returned {} quotes", self.id, seq, count);
                    FetchOutcome::Updated { count, at }
                }
                Err(e) => {
                    warn!("Quote poller {}: fetch {} failed, keeping last snapshot: {}", self.id, seq, e);
                    st.feed.stale = true;
                    st.feed.last_error = Some(e.to_string());
                    FetchOutcome::Failed(e.to_string())
                }
            };
            st.last_outcome = Some(outcome);
            st.feed.clone()
        };
        self.shared.settled.notify_all();
        self.shared.listeners.notify(&feed);
        true
    }
}
