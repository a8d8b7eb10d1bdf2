//! Watchlist store.
//!
//! Holds the symbols the signed-in user has starred and keeps them in step with the
//! remote watchlist. Toggles are optimistic: membership flips locally before the
//! remote call and flips back if the call fails. Each symbol moves through
//!
//! ```text
//! idle -> pending(add|remove) -> idle              (remote ok)
//! idle -> pending(add|remove) -> idle + rollback   (remote failed, symbol flagged)
//! ```
//!
//! While a toggle of a symbol is in flight, further toggles of that symbol join it
//! and return its outcome, so a burst of toggles flips membership exactly once.
//! Toggles of different symbols run concurrently.
//!
//! Mutations confirmed while a load is in flight are replayed on top of the loaded
//! list, since the remote read may predate them.
//!
//! All state belongs to one session generation. `clear` (logout) or attaching a
//! newer session empties it synchronously, and results of calls started under an
//! older generation are dropped.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use market_common::listeners::lock;
use market_common::{ListenerId, Listeners};
use strum_macros::Display;

use crate::api::MarketApi;
use crate::auth::Identity;
use crate::session::Session;

/// Direction of a watchlist mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Star the symbol.
    Add,
    /// Unstar the symbol.
    Remove,
}

/// A remote mutation that has been applied locally but not yet confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    /// Add or remove.
    pub direction: Direction,
    /// When the remote call was issued.
    pub started_at: DateTime<Utc>,
}

/// Last failed mutation of a symbol. Cleared by the next toggle of that symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationFailure {
    /// What was attempted.
    pub direction: Direction,
    /// Why it failed.
    pub error: String,
    /// When the failure was observed.
    pub at: DateTime<Utc>,
}

/// Everything a view needs to render the watchlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchlistSnapshot {
    /// Starred symbols, including optimistic changes.
    pub symbols: BTreeSet<String>,
    /// Mutations in flight, by symbol.
    pub pending: BTreeMap<String, PendingMutation>,
    /// Symbols whose last mutation failed.
    pub failed: BTreeMap<String, MutationFailure>,
    /// `true` once the remote list has been loaded for this session.
    pub loaded: bool,
}

/// Result of `toggle`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// The remote call succeeded; local state already reflected it.
    Applied(Direction),
    /// The remote call failed and membership was restored.
    RolledBack {
        /// What was attempted.
        direction: Direction,
        /// Why it failed.
        error: String,
    },
    /// The session changed before the toggle finished; nothing was applied.
    Discarded,
    /// Nobody is signed in.
    NotAuthenticated,
}

/// Outcome slot shared by a mutation and the toggles that joined it.
#[derive(Default)]
struct Settlement {
    outcome: Mutex<Option<ToggleOutcome>>,
    done: Condvar,
}

impl Settlement {
    /// First outcome wins.
    fn settle(&self, outcome: ToggleOutcome) {
        {
            let mut slot = lock(&self.outcome);
            if slot.is_none() {
                *slot = Some(outcome);
            }
        }
        self.done.notify_all();
    }

    fn wait(&self) -> ToggleOutcome {
        let mut slot = lock(&self.outcome);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct WatchState {
    generation: u64,
    identity: Option<Arc<dyn Identity>>,
    snapshot: WatchlistSnapshot,
    in_flight: HashMap<String, Arc<Settlement>>,
    /// Bumped on every confirmed mutation.
    revision: u64,
    /// Latest confirmed mutation per symbol, with the revision it was confirmed at.
    confirmed: HashMap<String, (u64, Direction)>,
}

impl WatchState {
    fn reset(&mut self, generation: u64, identity: Option<Arc<dyn Identity>>) {
        self.generation = generation;
        self.identity = identity;
        self.snapshot = WatchlistSnapshot::default();
        self.confirmed.clear();
        for (_, settlement) in self.in_flight.drain() {
            settlement.settle(ToggleOutcome::Discarded);
        }
    }
}

fn apply(symbols: &mut BTreeSet<String>, symbol: &str, direction: Direction) {
    match direction {
        Direction::Add => symbols.insert(String::from(symbol)),
        Direction::Remove => symbols.remove(symbol),
    };
}

/// Starred symbols of the signed-in user.
pub struct WatchlistStore {
    api: Arc<dyn MarketApi>,
    state: Mutex<WatchState>,
    listeners: Listeners<WatchlistSnapshot>,
}

impl WatchlistStore {
    /// Create an empty, signed-out store.
    pub fn new(api: Arc<dyn MarketApi>) -> Self {
        WatchlistStore {
            api,
            state: Mutex::new(WatchState {
                generation: 0,
                identity: None,
                snapshot: WatchlistSnapshot::default(),
                in_flight: HashMap::new(),
                revision: 0,
                confirmed: HashMap::new(),
            }),
            listeners: Listeners::new(),
        }
    }

    /// Bind the store to `session` without loading.
    ///
    /// A newer session empties the store synchronously. Returns `false` if `session`
    /// is older than one already seen.
    pub fn attach(&self, session: &Session) -> bool {
        let snapshot = {
            let mut st = lock(&self.state);
            if session.generation < st.generation {
                debug!(
                    "Ignoring watchlist attach for session {} (current {})",
                    session.generation, st.generation
                );
                return false;
            }
            let same_user = session.generation == st.generation
                && st.identity.as_ref().map(|i| i.uid()) == session.uid();
            if same_user {
                return true;
            }
            st.reset(session.generation, session.identity.clone());
            st.snapshot.clone()
        };
        self.listeners.notify(&snapshot);
        true
    }

    /// Empty the store because `session` has no identity. Runs synchronously.
    pub fn clear(&self, session: &Session) {
        let snapshot = {
            let mut st = lock(&self.state);
            if session.generation < st.generation {
                return;
            }
            st.reset(session.generation, None);
            st.snapshot.clone()
        };
        info!("Watchlist cleared for session {}", session.generation);
        self.listeners.notify(&snapshot);
    }

    /// Fetch the remote watchlist for `session`.
    ///
    /// Never fails: a signed-out or outdated session, or any remote error, yields an
    /// empty set. Errors are logged so the caller can decide whether to retry.
    pub fn load(&self, session: &Session) -> BTreeSet<String> {
        if !self.attach(session) {
            return BTreeSet::new();
        }
        let identity = match &session.identity {
            Some(identity) => Arc::clone(identity),
            None => {
                self.clear(session);
                return BTreeSet::new();
            }
        };

        let since = lock(&self.state).revision;
        let result = identity
            .id_token()
            .and_then(|token| self.api.fetch_watchlist(&token));

        let (symbols, snapshot) = {
            let mut st = lock(&self.state);
            if st.generation != session.generation {
                debug!("Dropping watchlist loaded for session {}", session.generation);
                return BTreeSet::new();
            }
            let symbols = match result {
                Ok(remote) => {
                    let mut symbols: BTreeSet<String> = remote.into_iter().collect();
                    for (symbol, (revision, direction)) in &st.confirmed {
                        if *revision > since {
                            debug!("Replaying {} {} confirmed during load", direction, symbol);
                            apply(&mut symbols, symbol, *direction);
                        }
                    }
                    for (symbol, pending) in &st.snapshot.pending {
                        apply(&mut symbols, symbol, pending.direction);
                    }
                    st.snapshot.symbols = symbols.clone();
                    st.snapshot.loaded = true;
                    info!("Watchlist loaded for {}: {} symbols", identity.uid(), symbols.len());
                    symbols
                }
                Err(e) => {
                    warn!("Failed to load watchlist for {}: {}", identity.uid(), e);
                    BTreeSet::new()
                }
            };
            (symbols, st.snapshot.clone())
        };
        self.listeners.notify(&snapshot);
        symbols
    }

    /// Flip membership of `symbol`, optimistically, then confirm remotely.
    ///
    /// Blocks until the remote call settles. If a toggle of the same symbol is
    /// already in flight, no new mutation is issued: this call waits for that one
    /// and returns its outcome.
    pub fn toggle(&self, symbol: &str) -> ToggleOutcome {
        let mut st = lock(&self.state);
        let identity = match &st.identity {
            Some(identity) => Arc::clone(identity),
            None => return ToggleOutcome::NotAuthenticated,
        };
        if let Some(settlement) = st.in_flight.get(symbol).cloned() {
            drop(st);
            debug!("Toggle of {} joins the mutation in flight", symbol);
            return settlement.wait();
        }
        let generation = st.generation;
        let settlement = Arc::new(Settlement::default());
        st.in_flight.insert(String::from(symbol), Arc::clone(&settlement));

        let was_member = st.snapshot.symbols.contains(symbol);
        let direction = if was_member {
            Direction::Remove
        } else {
            Direction::Add
        };
        apply(&mut st.snapshot.symbols, symbol, direction);
        st.snapshot.failed.remove(symbol);
        st.snapshot.pending.insert(
            String::from(symbol),
            PendingMutation {
                direction,
                started_at: Utc::now(),
            },
        );
        let snapshot = st.snapshot.clone();
        drop(st);
        self.listeners.notify(&snapshot);

        debug!("Watchlist {} {} for {}", direction, symbol, identity.uid());
        let result = identity.id_token().and_then(|token| match direction {
            Direction::Add => self.api.add_to_watchlist(&token, symbol),
            Direction::Remove => self.api.remove_from_watchlist(&token, symbol),
        });

        let (outcome, snapshot) = {
            let mut st = lock(&self.state);
            if st.generation != generation {
                debug!("Dropping {} {} result from an ended session", direction, symbol);
                settlement.settle(ToggleOutcome::Discarded);
                return ToggleOutcome::Discarded;
            }
            st.in_flight.remove(symbol);
            st.snapshot.pending.remove(symbol);
            let outcome = match result {
                Ok(()) => {
                    st.revision += 1;
                    let revision = st.revision;
                    st.confirmed.insert(String::from(symbol), (revision, direction));
                    ToggleOutcome::Applied(direction)
                }
                Err(e) => {
                    warn!("Watchlist {} {} failed, rolling back: {}", direction, symbol, e);
                    let rollback = match direction {
                        Direction::Add => Direction::Remove,
                        Direction::Remove => Direction::Add,
                    };
                    apply(&mut st.snapshot.symbols, symbol, rollback);
                    st.snapshot.failed.insert(
                        String::from(symbol),
                        MutationFailure {
                            direction,
                            error: e.to_string(),
                            at: Utc::now(),
                        },
                    );
                    ToggleOutcome::RolledBack {
                        direction,
                        error: e.to_string(),
                    }
                }
            };
            (outcome, st.snapshot.clone())
        };
        settlement.settle(outcome.clone());
        self.listeners.notify(&snapshot);
        outcome
    }

    /// Current state.
    pub fn snapshot(&self) -> WatchlistSnapshot {
        lock(&self.state).snapshot.clone()
    }

    /// Starred symbols, including optimistic changes.
    pub fn symbols(&self) -> BTreeSet<String> {
        lock(&self.state).snapshot.symbols.clone()
    }

    /// `true` if `symbol` is currently starred.
    pub fn contains(&self, symbol: &str) -> bool {
        lock(&self.state).snapshot.symbols.contains(symbol)
    }

    /// Mutation in flight for `symbol`, if any.
    pub fn pending(&self, symbol: &str) -> Option<PendingMutation> {
        lock(&self.state).snapshot.pending.get(symbol).cloned()
    }

    /// Last failure for `symbol`, if its most recent toggle failed.
    pub fn failure(&self, symbol: &str) -> Option<MutationFailure> {
        lock(&self.state).snapshot.failed.get(symbol).cloned()
    }

    /// Register a callback for every state change.
    pub fn subscribe(
        &self,
        listener: impl Fn(&WatchlistSnapshot) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Remove a callback added with `subscribe`.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.listeners.unsubscribe(id);
    }
}
