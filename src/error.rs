// src/error.rs
// =============================================================================
// Error types for the three core components.
//
// Each component gets its own enum so callers can tell a dead Tor circuit
// apart from a broken API response or a full disk. main.rs folds all of them
// into anyhow::Error at the application boundary.
//
// Rust concepts:
// - thiserror: derives Display and Error from the #[error(...)] attributes
// - #[from]: lets the ? operator convert one error type into another
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the anonymizing transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// No tor binary was configured and none was found on PATH
    #[error("tor binary not found (set TOR_CMD or pass --tor-cmd)")]
    TorNotFound,

    /// The tor process could not be spawned or exited during bootstrap
    #[error("failed to launch tor: {0}")]
    Launch(String),

    /// tor did not report a finished bootstrap in time
    #[error("tor did not bootstrap within {0:?}")]
    LaunchTimeout(Duration),

    /// I/O on the control port failed
    #[error("control port {port}: {source}")]
    Control {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The control port rejected AUTHENTICATE
    #[error("control port authentication failed: {0}")]
    Authentication(String),

    /// The proxied HTTP request failed
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures of a crawl cycle
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Only the JSON API is supported
    #[error("unsupported API format '{0}': only json is supported")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote answered with a non-2xx status
    #[error("{url} returned HTTP {status}")]
    UnexpectedStatus { url: String, status: u16 },

    /// The remote answered with something other than the expected shape
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failures of the normalizing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but is not a document store
    #[error("corrupt document store {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid timezone '{0}': expected UTC or an offset like +02:00")]
    InvalidTimezone(String),

    #[error("timestamp {0} cannot be represented as a calendar date")]
    InvalidTimestamp(i64),
}

/// A failed crawl-and-store cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("crawl failed: {0}")]
    Crawl(#[from] CrawlError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
