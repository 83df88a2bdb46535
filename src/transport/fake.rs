// src/transport/fake.rs
// In-memory Transport for tests: serves canned bodies by URL and records
// every request and close() call.

use super::{FetchedResponse, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct FakeLog {
    pub requests: Vec<String>,
    pub closes: usize,
}

#[derive(Default)]
pub struct FakeTransport {
    responses: HashMap<String, FetchedResponse>,
    pub log: Arc<Mutex<FakeLog>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&mut self, url: &str, body: serde_json::Value) {
        self.serve_raw(url, 200, &body.to_string());
    }

    pub fn serve_raw(&mut self, url: &str, status: u16, body: &str) {
        self.responses.insert(
            url.to_string(),
            FetchedResponse {
                status,
                body: body.to_string(),
            },
        );
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_with_refresh(&mut self, url: &str) -> Result<FetchedResponse, TransportError> {
        self.log.lock().unwrap().requests.push(url.to_string());
        // Unknown URLs behave like the site's "no such page" answer
        Ok(self.responses.get(url).cloned().unwrap_or(FetchedResponse {
            status: 200,
            body: r#"{"result": {"error": "not found"}}"#.to_string(),
        }))
    }

    async fn close(&mut self) {
        self.log.lock().unwrap().closes += 1;
    }
}
