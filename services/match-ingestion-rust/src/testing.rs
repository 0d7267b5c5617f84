//! In-process doubles shared by unit tests.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::AttemptError;
use crate::fetch::{RetryPolicy, RetryingFetcher, Transport};
use crate::pacing::RequestPacer;
use crate::upstream::{UpstreamClient, UpstreamSettings};

type Handler = Box<dyn Fn(&Url) -> Result<Value, AttemptError> + Send + Sync>;

/// Transport answering every request through a closure and recording the URLs.
pub struct ScriptedTransport {
    handler: Handler,
    calls: Mutex<Vec<Url>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&Url) -> Result<Value, AttemptError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Url> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, AttemptError> {
        self.calls.lock().unwrap().push(url.clone());
        (self.handler)(url)
    }
}

pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub fn settings() -> UpstreamSettings {
    UpstreamSettings {
        base_url: Url::parse("https://api.example.test").unwrap(),
        token: "test-token".to_string(),
        sport_id: 92,
        per_page: 100,
    }
}

/// Upstream client with no pacing and a 1 ms retry base.
pub fn client(transport: Arc<ScriptedTransport>, max_attempts: u32) -> Arc<UpstreamClient> {
    let fetcher = RetryingFetcher::new(
        transport,
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        },
        Arc::new(RequestPacer::unlimited()),
    );
    Arc::new(UpstreamClient::new(settings(), fetcher))
}
