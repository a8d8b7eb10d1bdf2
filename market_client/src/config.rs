//! Client configuration.
use std::path::PathBuf;
use std::time::Duration;

use market_common::net::{
    DEFAULT_API_BASE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_THEME_FILE,
};

use crate::poller::PollerConfig;

/// Settings of a dashboard instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL of the remote market API.
    pub api_base: String,
    /// Delay between the end of one quote fetch and the start of the next.
    pub poll_interval: Duration,
    /// Per-request network timeout.
    pub request_timeout: Duration,
    /// Preference file holding the theme.
    pub theme_path: PathBuf,
}

impl ClientConfig {
    /// Poller settings derived from this config.
    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_base: String::from(DEFAULT_API_BASE),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            theme_path: PathBuf::from(DEFAULT_THEME_FILE),
        }
    }
}
