// src/store/normalize.rs
// =============================================================================
// Rewrites a projected paste into its stored form.
//
// Rules, per field:
// - timestamp: epoch seconds -> ISO-8601 with an explicit offset
// - author: placeholder names -> "Unknown" (see registry.rs)
// - any other string: trimmed, CRLF -> LF (only when stripping is on)
//
// Normalizing a record that is already normalized changes nothing, so a
// record can safely pass through here twice.
// =============================================================================

use super::registry::{UnknownAuthors, UNKNOWN_AUTHOR};
use crate::crawl::ProjectedPaste;
use crate::error::StoreError;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct Normalizer {
    offset: FixedOffset,
    strip: bool,
    unknown_authors: UnknownAuthors,
}

impl Normalizer {
    pub fn new(timezone: &str, strip: bool, unknown_authors: UnknownAuthors) -> Result<Self, StoreError> {
        Ok(Self {
            offset: parse_timezone(timezone)?,
            strip,
            unknown_authors,
        })
    }

    pub fn unknown_authors_mut(&mut self) -> &mut UnknownAuthors {
        &mut self.unknown_authors
    }

    /// Rewrites `record` in place
    pub fn normalize(&self, record: &mut ProjectedPaste) -> Result<(), StoreError> {
        for (key, value) in record.iter_mut() {
            match key.as_str() {
                "timestamp" => self.normalize_timestamp(value)?,
                "author" => self.normalize_author(value),
                _ => {
                    if let Value::String(s) = value {
                        if self.strip {
                            *s = clean(s);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Epoch seconds rendered in the configured zone
    pub fn format_timestamp(&self, seconds: i64) -> Result<String, StoreError> {
        let utc = DateTime::from_timestamp(seconds, 0).ok_or(StoreError::InvalidTimestamp(seconds))?;
        Ok(utc
            .with_timezone(&self.offset)
            .to_rfc3339_opts(SecondsFormat::Secs, false))
    }

    fn normalize_timestamp(&self, value: &mut Value) -> Result<(), StoreError> {
        let seconds = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            // Already converted, or a numeric string straight from the site
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.timestamp())
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
            _ => None,
        };
        if let Some(seconds) = seconds {
            *value = Value::String(self.format_timestamp(seconds)?);
        }
        Ok(())
    }

    fn normalize_author(&self, value: &mut Value) {
        match value {
            Value::Null => *value = Value::String(UNKNOWN_AUTHOR.to_string()),
            Value::String(s) => {
                let author = if self.strip { clean(s) } else { s.clone() };
                *s = self.unknown_authors.canonicalize(&author).to_string();
            }
            _ => {}
        }
    }
}

fn clean(s: &str) -> String {
    s.trim().replace("\r\n", "\n")
}

// "UTC"/"Z"/"GMT" or a fixed offset such as "+02:00"
fn parse_timezone(timezone: &str) -> Result<FixedOffset, StoreError> {
    let tz = timezone.trim();
    if ["utc", "z", "gmt"].contains(&tz.to_ascii_lowercase().as_str()) {
        return FixedOffset::east_opt(0).ok_or_else(|| StoreError::InvalidTimezone(tz.to_string()));
    }
    tz.parse::<FixedOffset>()
        .map_err(|_| StoreError::InvalidTimezone(timezone.to_string()))
}
