//! Command-line arguments for the market watch client.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;
use market_common::net::{
    DEFAULT_API_BASE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_THEME_FILE,
};
use market_common::{Scope, SortOrder};

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Root URL of the market API.
    #[clap(long, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// User id the session is opened for.
    #[clap(long)]
    pub uid: String,

    /// File holding the bearer token. It is re-read before every request,
    /// so an external process may rotate it.
    #[clap(long)]
    pub token_file: String,

    /// Name shown in the greeting.
    #[clap(long)]
    pub display_name: Option<String>,

    /// Delay between the end of one quote fetch and the start of the next, in
    /// milliseconds. At least one second.
    #[clap(
        long,
        default_value_t = DEFAULT_POLL_INTERVAL_MS,
        value_parser = clap::value_parser!(u64).range(MIN_POLL_INTERVAL_MS..)
    )]
    pub interval_ms: u64,

    /// Per-request timeout in milliseconds.
    #[clap(
        long,
        default_value_t = DEFAULT_REQUEST_TIMEOUT_MS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout_ms: u64,

    /// Case-insensitive text matched against symbol or company name.
    #[clap(long, default_value = "")]
    pub search: String,

    /// Which stocks to list.
    #[clap(long, value_enum, default_value_t = Scope::All)]
    pub scope: Scope,

    /// Row ordering.
    #[clap(long, value_enum, default_value_t = SortOrder::Listed)]
    pub sort: SortOrder,

    /// Preference file holding the theme.
    #[clap(long, default_value = DEFAULT_THEME_FILE)]
    pub theme_file: String,

    /// Flip the saved theme before starting.
    #[clap(long)]
    pub toggle_theme: bool,

    /// Add a symbol to the watchlist once it is loaded. Symbols already on it are
    /// left alone. May be repeated.
    #[clap(long = "star")]
    pub stars: Vec<String>,
}

/// Lower bound of `--interval-ms`.
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
