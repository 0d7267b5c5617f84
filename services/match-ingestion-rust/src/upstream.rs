//! Typed access to the betting-data API endpoints.

use reqwest::Url;
use tracing::warn;

use crate::error::FetchError;
use crate::fetch::RetryingFetcher;
use crate::wire::{MatchPage, OddsSummary, RawMatch};

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub base_url: Url,
    pub token: String,
    pub sport_id: i64,
    pub per_page: u32,
}

/// Paginated match feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    Ended,
    Upcoming,
}

impl Feed {
    fn path(self) -> &'static str {
        match self {
            Feed::Ended => "v3/events/ended",
            Feed::Upcoming => "v3/events/upcoming",
        }
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feed::Ended => f.write_str("ended"),
            Feed::Upcoming => f.write_str("upcoming"),
        }
    }
}

/// Decoded page plus the number of records upstream listed, usable or not.
#[derive(Debug, Default)]
pub struct PageContents {
    pub listed: usize,
    pub matches: Vec<RawMatch>,
}

pub struct UpstreamClient {
    settings: UpstreamSettings,
    fetcher: RetryingFetcher,
}

impl UpstreamClient {
    pub fn new(settings: UpstreamSettings, fetcher: RetryingFetcher) -> Self {
        Self { settings, fetcher }
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Url {
        let mut url = self.settings.base_url.clone();
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{}/{}", base_path, path));
        url.set_query(None);
        url.query_pairs_mut().extend_pairs(query);
        url
    }

    pub fn page_url(&self, feed: Feed, league_id: i64, page: u32) -> Url {
        self.endpoint(
            feed.path(),
            &[
                ("sport_id", self.settings.sport_id.to_string()),
                ("token", self.settings.token.clone()),
                ("league_id", league_id.to_string()),
                ("per_page", self.settings.per_page.to_string()),
                ("page", page.to_string()),
            ],
        )
    }

    pub fn odds_url(&self, event_id: i64) -> Url {
        self.endpoint(
            "v2/event/odds/summary",
            &[
                ("token", self.settings.token.clone()),
                ("event_id", event_id.to_string()),
            ],
        )
    }

    /// One page of a match feed. A malformed envelope reads as an empty page.
    pub async fn fetch_page(
        &self,
        feed: Feed,
        league_id: i64,
        page: u32,
    ) -> Result<PageContents, FetchError> {
        let document = self.fetcher.fetch(&self.page_url(feed, league_id, page)).await?;
        let envelope: MatchPage = serde_json::from_value(document).unwrap_or_else(|e| {
            warn!(%feed, league_id, page, "Unreadable page envelope: {}", e);
            MatchPage::default()
        });
        Ok(PageContents {
            listed: envelope.results.len(),
            matches: envelope.into_matches(),
        })
    }

    pub async fn odds_summary(&self, event_id: i64) -> Result<OddsSummary, FetchError> {
        let document = self.fetcher.fetch(&self.odds_url(event_id)).await?;
        Ok(serde_json::from_value(document).unwrap_or_else(|e| {
            warn!(event_id, "Unreadable odds summary: {}", e);
            OddsSummary::default()
        }))
    }
}
