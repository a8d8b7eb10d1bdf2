//! In-process fakes shared by the unit tests of this crate.
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use market_common::{MarketError, Quote, Result};

use crate::api::{MarketApi, UserProfile};
use crate::auth::Identity;
use crate::session::Session;

const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Identity whose tokens are numbered so tests can see that each request mints anew.
#[derive(Debug)]
pub struct FakeIdentity {
    uid: String,
    mints: AtomicUsize,
}

impl FakeIdentity {
    pub fn new(uid: &str) -> Arc<FakeIdentity> {
        Arc::new(FakeIdentity {
            uid: uid.to_string(),
            mints: AtomicUsize::new(0),
        })
    }

    pub fn arc(uid: &str) -> Arc<dyn Identity> {
        FakeIdentity::new(uid)
    }

    pub fn mints(&self) -> usize {
        self.mints.load(Ordering::SeqCst)
    }
}

impl Identity for FakeIdentity {
    fn uid(&self) -> &str {
        &self.uid
    }

    fn id_token(&self) -> Result<String> {
        let n = self.mints.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}-token-{}", self.uid, n))
    }
}

/// Holds calls in flight until the test releases them.
pub struct Gate {
    closed: AtomicBool,
    entered: (Sender<()>, Receiver<()>),
    permits: (Sender<()>, Receiver<()>),
}

impl Gate {
    fn new() -> Self {
        Gate {
            closed: AtomicBool::new(false),
            entered: unbounded(),
            permits: unbounded(),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn pass(&self) {
        if self.closed.load(Ordering::SeqCst) {
            let _ = self.entered.0.send(());
            let _ = self.permits.1.recv_timeout(GATE_TIMEOUT);
        }
    }

    pub fn wait_entered(&self) {
        self.entered
            .1
            .recv_timeout(GATE_TIMEOUT)
            .expect("call never reached the gate");
    }

    pub fn release(&self) {
        self.permits.0.send(()).unwrap();
    }
}

/// Scripted remote API.
pub struct FakeMarketApi {
    stock_responses: Mutex<VecDeque<Result<Vec<Quote>>>>,
    fallback_stocks: Mutex<Vec<Quote>>,
    pub stock_gate: Gate,
    pub stock_calls: AtomicUsize,
    pub tokens: Mutex<Vec<String>>,
    pub server_watchlist: Mutex<BTreeSet<String>>,
    pub watchlist_gate: Gate,
    pub fail_watchlist_load: AtomicBool,
    pub fail_mutations: AtomicBool,
    pub mutation_gate: Gate,
    pub mutations: Mutex<Vec<String>>,
    pub ensure_calls: AtomicUsize,
}

impl FakeMarketApi {
    pub fn new() -> Arc<FakeMarketApi> {
        Arc::new(FakeMarketApi {
            stock_responses: Mutex::new(VecDeque::new()),
            fallback_stocks: Mutex::new(Vec::new()),
            stock_gate: Gate::new(),
            stock_calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            server_watchlist: Mutex::new(BTreeSet::new()),
            watchlist_gate: Gate::new(),
            fail_watchlist_load: AtomicBool::new(false),
            fail_mutations: AtomicBool::new(false),
            mutation_gate: Gate::new(),
            mutations: Mutex::new(Vec::new()),
            ensure_calls: AtomicUsize::new(0),
        })
    }

    /// Stocks returned whenever no scripted response is queued.
    pub fn set_stocks(&self, quotes: Vec<Quote>) {
        *self.fallback_stocks.lock().unwrap() = quotes;
    }

    pub fn push_stocks(&self, response: Result<Vec<Quote>>) {
        self.stock_responses.lock().unwrap().push_back(response);
    }

    pub fn set_watchlist(&self, symbols: &[&str]) {
        *self.server_watchlist.lock().unwrap() = symbols.iter().map(|s| s.to_string()).collect();
    }

    pub fn stock_calls(&self) -> usize {
        self.stock_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    fn mutate(&self, token: &str, op: &str, symbol: &str) -> Result<()> {
        self.tokens.lock().unwrap().push(token.to_string());
        self.mutation_gate.pass();
        self.mutations.lock().unwrap().push(format!("{}:{}", op, symbol));
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(MarketError::Status {
                status: 500,
                url: format!("/watchlist/{}/{}", op, symbol),
            });
        }
        let mut server = self.server_watchlist.lock().unwrap();
        if op == "add" {
            server.insert(symbol.to_string());
        } else {
            server.remove(symbol);
        }
        Ok(())
    }
}

impl MarketApi for FakeMarketApi {
    fn fetch_stocks(&self, token: &str) -> Result<Vec<Quote>> {
        self.stock_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
        self.stock_gate.pass();
        let scripted = self.stock_responses.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(self.fallback_stocks.lock().unwrap().clone()),
        }
    }

    fn fetch_watchlist(&self, token: &str) -> Result<Vec<String>> {
        self.tokens.lock().unwrap().push(token.to_string());
        if self.fail_watchlist_load.load(Ordering::SeqCst) {
            return Err(MarketError::Timeout("/watchlist".to_string()));
        }
        let symbols: Vec<String> = self.server_watchlist.lock().unwrap().iter().cloned().collect();
        self.watchlist_gate.pass();
        Ok(symbols)
    }

    fn add_to_watchlist(&self, token: &str, symbol: &str) -> Result<()> {
        self.mutate(token, "add", symbol)
    }

    fn remove_from_watchlist(&self, token: &str, symbol: &str) -> Result<()> {
        self.mutate(token, "remove", symbol)
    }

    fn ensure_user(&self, _token: &str) -> Result<UserProfile> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UserProfile {
            uid: "fake".to_string(),
            email: None,
            name: None,
            picture: None,
            is_admin: false,
        })
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + GATE_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Resolved session for `identity`.
pub fn signed_in(identity: Arc<dyn Identity>, generation: u64) -> Session {
    Session {
        identity: Some(identity),
        is_loading: false,
        generation,
    }
}

/// Resolved session with nobody signed in.
pub fn signed_out(generation: u64) -> Session {
    Session {
        identity: None,
        is_loading: false,
        generation,
    }
}
