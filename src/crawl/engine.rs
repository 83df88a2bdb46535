// src/crawl/engine.rs
// =============================================================================
// The crawl engine walks the paste listing newest-first and stops as soon as
// a page reaches back past the watermark.
//
// How a cycle works:
// 1. Fetch listing page 1, 2, 3, ... (one request at a time)
// 2. Fetch the detail of every paste on the page
// 3. Keep pastes published strictly after the watermark
// 4. Track the oldest timestamp seen; once it is at or before the watermark,
//    older pages cannot hold anything new, so stop
// 5. Move the watermark to the moment the cycle started
//
// A page can straddle the watermark. That is why freshness is decided per
// paste in step 3 and not per page.
//
// Requests are strictly sequential. Hammering a Tor circuit with parallel
// requests makes it slow and unstable.
// =============================================================================

use super::paste::{parse_listing, parse_paste, ListingPage, Paste, ProjectedPaste};
use super::watermark::Watermark;
use crate::config::CrawlConfig;
use crate::error::CrawlError;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};
use url::Url;

/// API response formats offered by the site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Json,
    Xml,
}

impl FromStr for ApiFormat {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ApiFormat::Json),
            "xml" => Ok(ApiFormat::Xml),
            _ => Err(CrawlError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiFormat::Json => write!(f, "json"),
            ApiFormat::Xml => write!(f, "xml"),
        }
    }
}

pub struct CrawlEngine<T: Transport> {
    transport: T,
    base_url: Url,
    format: ApiFormat,
    fields: Vec<String>,
    max_pages: Option<u32>,
    watermark: Watermark,
}

impl<T: Transport> CrawlEngine<T> {
    /// Builds an engine. Rejects non-JSON formats before anything touches the network.
    pub fn new(transport: T, config: &CrawlConfig, watermark: Watermark) -> Result<Self, CrawlError> {
        let format: ApiFormat = config.api_format.parse()?;
        if format != ApiFormat::Json {
            // The site is unreliable in XML mode
            return Err(CrawlError::UnsupportedFormat(format.to_string()));
        }

        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(CrawlError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        Ok(Self {
            transport,
            base_url,
            format,
            fields: config.fields.clone(),
            max_pages: config.max_pages,
            watermark,
        })
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Caller override of the watermark, e.g. for a backfill
    pub fn set_watermark(&mut self, instant: DateTime<Utc>) {
        self.watermark.set(instant);
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Collects every paste published after the watermark, projected to the
    /// configured fields, then advances the watermark.
    pub async fn run_cycle(&mut self) -> Result<Vec<ProjectedPaste>, CrawlError> {
        let cycle_start = Utc::now();
        info!(since = %self.watermark.last_crawl(), "crawl cycle started");

        let mut page: u32 = 1;
        let mut oldest_seen: Option<DateTime<Utc>> = None;
        let mut collected: Vec<(String, Paste)> = Vec::new();

        while oldest_seen.map_or(true, |oldest| self.watermark.is_before(oldest)) {
            if let Some(max) = self.max_pages {
                if page > max {
                    warn!(max_pages = max, "page limit reached before the watermark");
                    break;
                }
            }

            let ids = match self.list_pastes(page).await? {
                ListingPage::Pastes(ids) => ids,
                ListingPage::EndOfPages => {
                    debug!(page, "listing page absent, end of pagination");
                    break;
                }
            };
            debug!(page, count = ids.len(), "listing page fetched");

            for id in ids {
                let (url, paste) = self.get_paste(&id).await?;
                let published = paste.published_at().ok_or_else(|| CrawlError::MalformedResponse {
                    url: url.clone(),
                    reason: format!("timestamp {} out of range", paste.timestamp),
                })?;

                oldest_seen = Some(oldest_seen.map_or(published, |oldest| oldest.min(published)));
                if self.watermark.is_before(published) {
                    collected.push((url, paste));
                }
            }

            page += 1;
        }

        self.watermark.advance_to(cycle_start);
        info!(found = collected.len(), pages = page - 1, "crawl cycle finished");

        collected
            .iter()
            .map(|(url, paste)| paste.project(&self.fields, url))
            .collect()
    }

    async fn list_pastes(&mut self, page: u32) -> Result<ListingPage, CrawlError> {
        let url = self.endpoint("list", &page.to_string())?;
        let body = self.fetch(&url).await?;
        parse_listing(&url, &body)
    }

    async fn get_paste(&mut self, id: &str) -> Result<(String, Paste), CrawlError> {
        let url = self.endpoint("show", id)?;
        let body = self.fetch(&url).await?;
        let paste = parse_paste(&url, id, &body)?;
        Ok((url, paste))
    }

    async fn fetch(&mut self, url: &str) -> Result<String, CrawlError> {
        let response = self.transport.fetch_with_refresh(url).await?;
        if !response.is_success() {
            return Err(CrawlError::UnexpectedStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response.body)
    }

    // Each part is pushed as one percent-encoded segment, so an id holding
    // '/', '?' or '#' cannot change the request target
    fn endpoint(&self, verb: &str, arg: &str) -> Result<String, CrawlError> {
        let format = self.format.to_string();
        let mut endpoint = self.base_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| CrawlError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["api", format.as_str(), verb, arg]);
        Ok(endpoint.to_string())
    }
}

// -----------------------------------------------------------------------------
// NOTES:
//
// 1. Why is the engine generic over T: Transport?
//    - Production uses TorTransport, tests use an in-memory fake
//    - Generics are resolved at compile time, so there is no dynamic dispatch
//
// 2. Why map_or(true, ...) in the loop condition?
//    - Before the first paste is seen there is no "oldest" yet, so keep going
//    - Afterwards, keep going only while the oldest paste is still new
//
// 3. Why does a failed cycle leave the watermark untouched?
//    - The `?` operator returns before advance_to() runs
//    - The next cycle then retries the same window
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;
    use serde_json::json;

    const BASE: &str = "http://paste.example.onion/";

    fn config() -> CrawlConfig {
        CrawlConfig {
            base_url: BASE.to_string(),
            ..CrawlConfig::default()
        }
    }

    fn list_url(page: u32) -> String {
        format!("{}api/json/list/{}", BASE, page)
    }

    fn show_url(id: &str) -> String {
        format!("{}api/json/show/{}", BASE, id)
    }

    fn serve_page(fake: &mut FakeTransport, page: u32, pastes: &[(&str, i64)]) {
        let ids: Vec<&str> = pastes.iter().map(|(id, _)| *id).collect();
        fake.serve(&list_url(page), json!({"result": {"pastes": ids}}));
        for (id, ts) in pastes {
            fake.serve(
                &show_url(id),
                json!({"result": {
                    "id": id,
                    "timestamp": ts,
                    "title": format!("title {}", id),
                    "author": "anonymous",
                    "data": "body",
                    "syntax": "text"
                }}),
            );
        }
    }

    fn titles(pastes: &[ProjectedPaste]) -> Vec<String> {
        pastes
            .iter()
            .map(|p| p["title"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_xml_format_rejected_eagerly() {
        let fake = FakeTransport::new();
        let log = fake.log.clone();
        let config = CrawlConfig {
            api_format: "xml".to_string(),
            ..config()
        };
        let result = CrawlEngine::new(fake, &config, Watermark::now());
        assert!(matches!(result, Err(CrawlError::UnsupportedFormat(_))));
        assert!(log.lock().unwrap().requests.is_empty());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let config = CrawlConfig {
            api_format: "yaml".to_string(),
            ..config()
        };
        let result = CrawlEngine::new(FakeTransport::new(), &config, Watermark::now());
        assert!(matches!(result, Err(CrawlError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let config = CrawlConfig {
            base_url: "http://paste.example.onion/mirror".to_string(),
            ..CrawlConfig::default()
        };
        let engine = CrawlEngine::new(FakeTransport::new(), &config, Watermark::now()).unwrap();
        assert_eq!(
            engine.endpoint("list", "3").unwrap(),
            "http://paste.example.onion/mirror/api/json/list/3"
        );
    }

    #[test]
    fn test_endpoint_escapes_paste_ids() {
        let engine = CrawlEngine::new(FakeTransport::new(), &config(), Watermark::now()).unwrap();
        assert_eq!(
            engine.endpoint("show", "a/b?c#d").unwrap(),
            "http://paste.example.onion/api/json/show/a%2Fb%3Fc%23d"
        );
        assert_eq!(engine.endpoint("list", "2").unwrap(), list_url(2));
    }

    #[test]
    fn test_non_base_url_rejected() {
        let config = CrawlConfig {
            base_url: "mailto:pastes@example.onion".to_string(),
            ..CrawlConfig::default()
        };
        let result = CrawlEngine::new(FakeTransport::new(), &config, Watermark::now());
        assert!(matches!(result, Err(CrawlError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_collects_exactly_pastes_after_watermark() {
        // Newest first: page 1 is all new, page 2 straddles the watermark
        let mut fake = FakeTransport::new();
        serve_page(&mut fake, 1, &[("a", 1_000), ("b", 900)]);
        serve_page(&mut fake, 2, &[("c", 800), ("d", 700)]);
        serve_page(&mut fake, 3, &[("e", 600), ("f", 500)]);
        let log = fake.log.clone();

        let watermark = Watermark::from_epoch(750).unwrap();
        let mut engine = CrawlEngine::new(fake, &config(), watermark).unwrap();
        let pastes = engine.run_cycle().await.unwrap();

        assert_eq!(titles(&pastes), vec!["title a", "title b", "title c"]);
        // Page 3 is older than the watermark and never requested
        let requests = &log.lock().unwrap().requests;
        assert!(!requests.contains(&list_url(3)));
        assert!(requests.contains(&show_url("d")));
    }

    #[tokio::test]
    async fn test_projection_uses_configured_fields() {
        let mut fake = FakeTransport::new();
        serve_page(&mut fake, 1, &[("a", 1_000)]);

        let mut engine =
            CrawlEngine::new(fake, &config(), Watermark::from_epoch(10).unwrap()).unwrap();
        let pastes = engine.run_cycle().await.unwrap();

        let keys: Vec<&str> = pastes[0].keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 4);
        for field in ["timestamp", "title", "author", "data"] {
            assert!(keys.contains(&field));
        }
    }

    #[tokio::test]
    async fn test_missing_listing_stops_without_error() {
        let mut fake = FakeTransport::new();
        serve_page(&mut fake, 1, &[("a", 1_000)]);
        fake.serve(&list_url(2), json!({"result": {"error": "no such page"}}));
        let log = fake.log.clone();

        let mut engine =
            CrawlEngine::new(fake, &config(), Watermark::from_epoch(10).unwrap()).unwrap();
        let pastes = engine.run_cycle().await.unwrap();

        assert_eq!(pastes.len(), 1);
        let requests = &log.lock().unwrap().requests;
        assert!(requests.contains(&list_url(2)));
        assert!(!requests.contains(&list_url(3)));
    }

    #[tokio::test]
    async fn test_watermark_advances_to_cycle_start() {
        let mut fake = FakeTransport::new();
        serve_page(&mut fake, 1, &[("a", 1_000)]);

        let mut engine =
            CrawlEngine::new(fake, &config(), Watermark::from_epoch(10).unwrap()).unwrap();
        let before = Utc::now();
        engine.run_cycle().await.unwrap();
        let first = engine.watermark().last_crawl();
        assert!(first >= before);

        // Nothing new the second time, but the watermark still moves forward
        let pastes = engine.run_cycle().await.unwrap();
        assert!(pastes.is_empty());
        assert!(engine.watermark().last_crawl() >= first);
    }

    #[tokio::test]
    async fn test_watermark_override_recovers_older_pastes() {
        let mut fake = FakeTransport::new();
        serve_page(&mut fake, 1, &[("a", 1_000), ("b", 900)]);

        let mut engine = CrawlEngine::new(fake, &config(), Watermark::now()).unwrap();
        engine.set_watermark(DateTime::from_timestamp(950, 0).unwrap());
        let pastes = engine.run_cycle().await.unwrap();
        assert_eq!(titles(&pastes), vec!["title a"]);
    }

    #[tokio::test]
    async fn test_empty_first_page_ends_cycle() {
        let fake = FakeTransport::new();
        let mut engine = CrawlEngine::new(fake, &config(), Watermark::now()).unwrap();
        assert!(engine.run_cycle().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_max_pages_caps_the_walk() {
        let mut fake = FakeTransport::new();
        serve_page(&mut fake, 1, &[("a", 1_000)]);
        serve_page(&mut fake, 2, &[("b", 900)]);
        let log = fake.log.clone();

        let config = CrawlConfig {
            max_pages: Some(1),
            ..config()
        };
        let mut engine = CrawlEngine::new(fake, &config, Watermark::from_epoch(10).unwrap()).unwrap();
        let pastes = engine.run_cycle().await.unwrap();

        assert_eq!(titles(&pastes), vec!["title a"]);
        assert!(!log.lock().unwrap().requests.contains(&list_url(2)));
    }

    #[tokio::test]
    async fn test_malformed_detail_fails_cycle() {
        let mut fake = FakeTransport::new();
        fake.serve(&list_url(1), json!({"result": {"pastes": ["a"]}}));
        fake.serve(&show_url("a"), json!({"result": {"title": "no timestamp"}}));

        let watermark = Watermark::from_epoch(10).unwrap();
        let mut engine = CrawlEngine::new(fake, &config(), watermark).unwrap();
        let result = engine.run_cycle().await;

        assert!(matches!(result, Err(CrawlError::MalformedResponse { .. })));
        // A failed cycle leaves the watermark alone
        assert_eq!(engine.watermark(), watermark);
    }

    #[tokio::test]
    async fn test_non_success_status_fails_cycle() {
        let mut fake = FakeTransport::new();
        fake.serve_raw(&list_url(1), 503, "Service Unavailable");

        let mut engine = CrawlEngine::new(fake, &config(), Watermark::now()).unwrap();
        let result = engine.run_cycle().await;
        assert!(matches!(
            result,
            Err(CrawlError::UnexpectedStatus { status: 503, .. })
        ));
    }
}
