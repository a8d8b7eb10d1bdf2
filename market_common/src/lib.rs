//!
//! Common types and utilities shared by the market watch client crates.
//!
//! This crate aggregates:
//! - `error`: unified error type `MarketError` used across the workspace.
//! - `result`: handy `Result<T, MarketError>` alias.
//! - `quote`: quote snapshot rows as served by the remote API.
//! - `filter`: search/scope/sort settings of a stock list view.
//! - `projection`: pure filtering, sorting and top-gainer derivations.
//! - `theme`: light/dark preference values.
//! - `listeners`: subscribe/notify registry used by every store.
//! - `net`: remote API paths and default tuning constants.
#![warn(missing_docs)]
pub mod error;
pub mod filter;
pub mod listeners;
pub mod net;
pub mod projection;
pub mod quote;
pub mod result;
pub mod theme;

pub use error::MarketError;
pub use filter::{Scope, SortOrder, ViewFilter};
pub use listeners::{ListenerId, Listeners};
pub use quote::Quote;
pub use result::Result;
pub use theme::Theme;
