//! Remote API paths and default tuning shared by the client crates.

/// Base URL of the hosted market API.
pub const DEFAULT_API_BASE: &str = "https://api.marketmuse.chinmaymisra.com/";

/// Full stock list with price/metrics snapshot.
pub const STOCKS_PATH: &str = "stocks";
/// Caller's watchlist.
pub const WATCHLIST_PATH: &str = "watchlist";
/// Prefix of the add-to-watchlist endpoint; the symbol is appended.
pub const WATCHLIST_ADD_PATH: &str = "watchlist/add";
/// Prefix of the remove-from-watchlist endpoint; the symbol is appended.
pub const WATCHLIST_REMOVE_PATH: &str = "watchlist/remove";
/// Ensures a backend user record exists for the caller.
pub const USER_ME_PATH: &str = "users/me";

/// Delay between the end of one quote fetch and the start of the next.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 60_000;
/// Per-request network timeout.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Storage key of the persisted theme preference.
pub const THEME_STORAGE_KEY: &str = "theme";
/// Default file name of the local preference store.
pub const DEFAULT_THEME_FILE: &str = "market_watch_prefs.json";

/// Join a base URL and a relative path with exactly one slash between them.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_with_single_slash() {
        assert_eq!(endpoint("http://h/", "/stocks"), "http://h/stocks");
        assert_eq!(endpoint("http://h", "stocks"), "http://h/stocks");
        assert_eq!(endpoint("http://h/api/", WATCHLIST_PATH), "http://h/api/watchlist");
    }
}
