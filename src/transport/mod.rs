// src/transport/mod.rs
// =============================================================================
// This module owns the road to the paste site: a Tor process, its control
// port, and an HTTP client that sends everything through Tor's SOCKS proxy.
//
// Submodules:
// - control: the tiny piece of the Tor control protocol we speak
// - tor: TorTransport, which launches tor on demand and issues requests
//
// The crawl engine only sees the Transport trait, so tests can hand it a
// fake that serves canned JSON without any network at all.
// =============================================================================

mod control;
#[cfg(test)]
pub mod fake;
mod tor;

pub use tor::TorTransport;

use crate::error::TransportError;
use async_trait::async_trait;

/// A raw HTTP answer. Judging the status code is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub body: String,
}

impl FetchedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Something that can fetch URLs over a live anonymizing circuit
#[async_trait]
pub trait Transport: Send {
    /// Makes sure the circuit is up (launching it if needed), then GETs `url`
    async fn fetch_with_refresh(&mut self, url: &str) -> Result<FetchedResponse, TransportError>;

    /// Releases the session, the control channel and any owned process.
    /// Calling it again must be harmless.
    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        let ok = FetchedResponse { status: 204, body: String::new() };
        let missing = FetchedResponse { status: 404, body: String::new() };
        assert!(ok.is_success());
        assert!(!missing.is_success());
    }
}
