// src/crawl/paste.rs
// =============================================================================
// Decoding of the paste site's JSON API.
//
// The site answers two kinds of requests:
//   api/json/list/{page} -> {"result": {"pastes": [id, id, ...]}}
//   api/json/show/{id}   -> {"result": {"timestamp": ..., "title": ..., ...}}
//
// A listing without result.pastes means the page does not exist, which is how
// the site says "no more pages". Everything else that does not fit the shape
// is a MalformedResponse.
// =============================================================================

use crate::error::CrawlError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A paste reduced to the configured fields, ready for the store
pub type ProjectedPaste = Map<String, Value>;

/// Outcome of fetching one listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingPage {
    Pastes(Vec<String>),
    EndOfPages,
}

/// A paste's detail record. `fields` keeps the whole `result` object so any
/// configured subset can be projected from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Paste {
    pub id: String,
    pub timestamp: i64,
    pub fields: Map<String, Value>,
}

impl Paste {
    /// Publication time as a UTC instant
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }

    /// Keeps exactly `fields`, in that order. A missing field is an error.
    pub fn project(&self, fields: &[String], url: &str) -> Result<ProjectedPaste, CrawlError> {
        let mut projected = Map::new();
        for field in fields {
            let value = self
                .fields
                .get(field)
                .cloned()
                .ok_or_else(|| malformed(url, format!("paste {} has no '{}' field", self.id, field)))?;
            projected.insert(field.clone(), value);
        }
        Ok(projected)
    }
}

pub fn parse_listing(url: &str, body: &str) -> Result<ListingPage, CrawlError> {
    let json: Value = serde_json::from_str(body).map_err(|e| malformed(url, e.to_string()))?;

    let pastes = match json.get("result").and_then(|result| result.get("pastes")) {
        Some(pastes) => pastes,
        None => return Ok(ListingPage::EndOfPages),
    };

    let ids = pastes
        .as_array()
        .ok_or_else(|| malformed(url, "'pastes' is not an array".to_string()))?
        .iter()
        .map(|id| paste_id(id).ok_or_else(|| malformed(url, format!("invalid paste id {}", id))))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ListingPage::Pastes(ids))
}

pub fn parse_paste(url: &str, id: &str, body: &str) -> Result<Paste, CrawlError> {
    let json: Value = serde_json::from_str(body).map_err(|e| malformed(url, e.to_string()))?;

    let fields = match json.get("result") {
        Some(Value::Object(fields)) => fields.clone(),
        _ => return Err(malformed(url, "missing 'result' object".to_string())),
    };

    let timestamp = fields
        .get("timestamp")
        .and_then(epoch_seconds)
        .ok_or_else(|| malformed(url, "missing or invalid 'timestamp'".to_string()))?;

    Ok(Paste {
        id: id.to_string(),
        timestamp,
        fields,
    })
}

// Ids are opaque: strings pass through, integers are rendered as text
fn paste_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// The site sends integers, but numeric strings show up too
fn epoch_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn malformed(url: &str, reason: String) -> CrawlError {
    CrawlError::MalformedResponse {
        url: url.to_string(),
        reason,
    }
}
