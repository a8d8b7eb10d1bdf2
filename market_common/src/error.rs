//! Error types shared by the market client crates.
//!
//! The `MarketError` enum unifies the failure cases of the client core: identity
//! and credential problems, remote API failures and local persistence, so every
//! crate can propagate a single error type.
use std::io;

use thiserror::Error;

/// Unified error type shared across the workspace.
#[derive(Error, Debug)]
pub enum MarketError {
    /// I/O error originating from the standard library (files, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// The remote call could not be completed (connect, DNS, body read, decode).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote call exceeded the configured per-request timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote API answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Numeric HTTP status code.
        status: u16,
        /// Request URL that produced the status.
        url: String,
    },

    /// A configured or derived URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The identity provider failed or could not mint a credential.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// An operation that needs a signed-in identity was called without one.
    #[error("No authenticated identity")]
    NotAuthenticated,

    /// Work was requested for a session older than one already seen.
    #[error("Session {generation} is superseded by session {current}")]
    SupersededSession {
        /// Generation of the session the work was requested for.
        generation: u64,
        /// Newest generation seen.
        current: u64,
    },
}

impl MarketError {
    /// Wrap any displayable transport failure.
    pub fn transport(err: impl std::fmt::Display) -> Self {
        MarketError::Transport(err.to_string())
    }
}
