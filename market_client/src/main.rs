//! Market Watch: a terminal client that keeps a live stock dashboard for one user.
//!
//! It signs in with a bearer token read from a file, polls the market API for quotes,
//! loads the user's watchlist, stars the requested symbols, and logs the
//! filtered stock list every time the quotes or the watchlist change.
//!
//! Usage example (CLI):
//! ```bash
//! market_watch --uid alice --token-file ./token.txt --scope watchlist-only --star NVDA
//! ```
//!
//! Logging follows `RUST_LOG`; the default level is `info`.
#![warn(missing_docs)]
mod args;

use crate::args::Args;
use clap::Parser;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use log::{error, info, warn};
use market_client::{
    ClientConfig, Dashboard, DashboardView, HttpMarketApi, StaticIdentityProvider, ThemeStore,
    TokenFileIdentity, ToggleOutcome,
};
use market_common::{MarketError, Result, Theme, ViewFilter};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

const TICK: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down client...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| MarketError::Io(io::Error::other(e)))?;
    }

    let config = ClientConfig {
        api_base: args.api_base.trim().to_string(),
        poll_interval: Duration::from_millis(args.interval_ms),
        request_timeout: Duration::from_millis(args.timeout_ms),
        theme_path: normalize_path(&args.theme_file),
    };

    let themes = ThemeStore::open(&config.theme_path);
    let theme = if args.toggle_theme {
        themes.toggle()?
    } else {
        themes.load()
    };
    info!("Theme: {}", theme);

    let mut identity = TokenFileIdentity::new(args.uid.trim(), normalize_path(&args.token_file));
    if let Some(name) = &args.display_name {
        identity = identity.with_display_name(name);
    }
    let provider = Arc::new(StaticIdentityProvider::signed_in(Arc::new(identity)));
    let api = Arc::new(HttpMarketApi::new(&config.api_base, config.request_timeout)?);
    info!("Using market API at {}", config.api_base);

    let dashboard = Dashboard::start(provider, api, &config);
    let session = dashboard.session();
    match session.identity.as_ref() {
        Some(identity) => info!(
            "Welcome, {}",
            identity.display_name().unwrap_or(identity.uid())
        ),
        None => warn!("No user is signed in"),
    }

    let filter = ViewFilter::search(args.search.trim())
        .with_scope(args.scope)
        .with_sort(args.sort);

    let (changed_tx, changed_rx) = unbounded::<()>();
    {
        let changed_tx = changed_tx.clone();
        dashboard.on_feed(move |_| {
            let _ = changed_tx.send(());
        });
    }
    dashboard.watchlist().subscribe(move |_| {
        let _ = changed_tx.send(());
    });

    let mut pending_stars = args.stars.clone();
    info!("Client is running. Press Ctrl+C to exit.");
    while !shutdown.load(Ordering::SeqCst) {
        match changed_rx.recv_timeout(TICK) {
            Ok(()) => {
                while changed_rx.try_recv().is_ok() {}
                print_view(&dashboard.view(&filter), theme);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if !pending_stars.is_empty() {
            let watch = dashboard.watchlist().snapshot();
            if watch.loaded {
                for symbol in unstarred(&pending_stars, &watch.symbols) {
                    star(&dashboard, &symbol);
                }
                pending_stars.clear();
            }
        }
    }

    info!("Signing out...");
    if let Err(e) = dashboard.sign_out() {
        error!("Sign out failed: {}", e);
    }
    Ok(())
}

/// Requested symbols not yet on the watchlist, trimmed and without repeats.
fn unstarred(requested: &[String], watchlist: &BTreeSet<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for symbol in requested.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if watchlist.contains(symbol) {
            info!("{} is already on the watchlist", symbol);
        } else if !out.iter().any(|s| s == symbol) {
            out.push(String::from(symbol));
        }
    }
    out
}

fn star(dashboard: &Dashboard, symbol: &str) {
    match dashboard.toggle(symbol) {
        ToggleOutcome::Applied(direction) => info!("Watchlist {}: {}", direction, symbol),
        ToggleOutcome::RolledBack { direction, error } => {
            warn!("Watchlist {} of {} rolled back: {}", direction, symbol, error)
        }
        ToggleOutcome::Discarded => info!("Watchlist change of {} discarded", symbol),
        ToggleOutcome::NotAuthenticated => warn!("Sign in to change the watchlist"),
    }
}

fn print_view(view: &DashboardView, theme: Theme) {
    let star = match theme {
        Theme::Dark => "*",
        Theme::Light => "+",
    };
    match view.last_updated {
        Some(at) => info!("Last updated {}", at.format("%H:%M:%S")),
        None if view.refreshing => info!("Loading quotes..."),
        None => info!("No quotes yet"),
    }
    if view.stale {
        warn!(
            "Showing stale quotes: {}",
            view.last_error.as_deref().unwrap_or("fetch failed")
        );
    }
    if let Some(symbol) = &view.top_gainer {
        info!("Top gainer: {}", symbol);
    }
    for quote in &view.rows {
        let marker = if view.watchlist.contains(&quote.symbol) { star } else { " " };
        let failed = if view.failed.contains(&quote.symbol) { " (watchlist update failed)" } else { "" };
        match quote.defined_change_pct() {
            Some(pct) => info!(
                "{} {:<6} {:>10.2} {:>+7.2}% {}{}",
                marker, quote.symbol, quote.price, pct, quote.display_name, failed
            ),
            None => info!(
                "{} {:<6} {:>10.2} {:>8} {}{}",
                marker, quote.symbol, quote.price, "n/a", quote.display_name, failed
            ),
        }
    }
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Normalize a CLI-provided path string by trimming whitespace and matching quotes.
fn normalize_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim();
    let no_quotes = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    PathBuf::from(no_quotes)
}
