// src/crawl/watermark.rs
// =============================================================================
// The watermark: everything published after it still needs collecting.
//
// After a finished cycle the watermark moves to the instant the cycle
// *started*, not to the newest paste seen. The next cycle therefore re-scans a
// short overlap, which keeps clock skew between us and the site from ever
// hiding a paste.
// =============================================================================

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    last_crawl: DateTime<Utc>,
}

impl Watermark {
    /// Starts at the current time, read when called
    pub fn now() -> Self {
        Self { last_crawl: Utc::now() }
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { last_crawl: instant }
    }

    /// Starts at an explicit epoch timestamp; None if out of range
    pub fn from_epoch(seconds: i64) -> Option<Self> {
        DateTime::from_timestamp(seconds, 0).map(Self::at)
    }

    pub fn last_crawl(&self) -> DateTime<Utc> {
        self.last_crawl
    }

    /// Caller override, may move backwards (e.g. for a backfill)
    pub fn set(&mut self, instant: DateTime<Utc>) {
        self.last_crawl = instant;
    }

    /// Moves forward to `instant`; never moves backwards
    pub fn advance_to(&mut self, instant: DateTime<Utc>) {
        if instant > self.last_crawl {
            self.last_crawl = instant;
        }
    }

    /// True if `instant` is strictly after the watermark
    pub fn is_before(&self, instant: DateTime<Utc>) -> bool {
        instant > self.last_crawl
    }
}
