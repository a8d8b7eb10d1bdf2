//! Market watch client core.
//!
//! - `session`: republishes identity provider changes as `Session` values.
//! - `poller`: periodic quote fetching bound to one session at a time.
//! - `watchlist`: starred symbols with optimistic, per-symbol serialized toggles.
//! - `dashboard`: wires the three together and projects views.
//! - `api`: remote market API trait and its HTTP implementation.
//! - `auth`: identity and identity provider seams.
//! - `theme_store`: persisted light/dark preference.
#![warn(missing_docs)]
pub mod api;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod poller;
pub mod session;
pub mod theme_store;
pub mod watchlist;

#[cfg(test)]
mod testing;

pub use api::{HttpMarketApi, MarketApi, UserProfile};
pub use auth::{Identity, IdentityProvider, StaticIdentityProvider, TokenFileIdentity};
pub use config::ClientConfig;
pub use dashboard::{Dashboard, DashboardView};
pub use poller::{FetchOutcome, PollHandle, PollerConfig, QuoteFeed, QuotePoller};
pub use session::{Session, SessionObserver};
pub use theme_store::ThemeStore;
pub use watchlist::{Direction, ToggleOutcome, WatchlistSnapshot, WatchlistStore};
