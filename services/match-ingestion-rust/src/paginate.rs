//! Page-by-page traversal of a match feed across leagues.

use tracing::{info, warn};

use crate::error::FetchError;
use crate::pacing::RequestPacer;
use crate::upstream::{Feed, UpstreamClient};
use crate::wire::RawMatch;

/// A non-empty page of matches.
#[derive(Debug, Clone)]
pub struct Page {
    pub league_id: i64,
    pub number: u32,
    pub matches: Vec<RawMatch>,
}

/// A page fetch that failed after the first page of the run.
#[derive(Debug, Clone)]
pub struct PageFailure {
    pub league_id: i64,
    pub page: u32,
    pub error: FetchError,
}

/// Walks pages `1..=max_pages` of each league in order.
///
/// An empty page ends the current league only. If the very first fetch of
/// the run fails the error is returned; later failures end the current
/// league, are recorded, and traversal moves on to the next league.
pub struct Paginator<'a> {
    client: &'a UpstreamClient,
    pacer: &'a RequestPacer,
    feed: Feed,
    leagues: Vec<i64>,
    max_pages: u32,
    league_idx: usize,
    page: u32,
    started: bool,
    failures: Vec<PageFailure>,
}

impl<'a> Paginator<'a> {
    pub fn new(
        client: &'a UpstreamClient,
        pacer: &'a RequestPacer,
        feed: Feed,
        leagues: &[i64],
        max_pages: u32,
    ) -> Self {
        Self {
            client,
            pacer,
            feed,
            leagues: leagues.to_vec(),
            max_pages,
            league_idx: 0,
            page: 1,
            started: false,
            failures: Vec::new(),
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Page>, FetchError> {
        loop {
            let Some(&league_id) = self.leagues.get(self.league_idx) else {
                return Ok(None);
            };
            if self.page > self.max_pages {
                info!(feed = %self.feed, league_id, "Page ceiling reached");
                self.next_league();
                continue;
            }

            let number = self.page;
            let first = !self.started;
            self.started = true;
            self.pacer.until_ready().await;

            match self.client.fetch_page(self.feed, league_id, number).await {
                Ok(contents) if contents.listed == 0 => {
                    info!(feed = %self.feed, league_id, page = number, "Empty page, league done");
                    self.next_league();
                }
                Ok(contents) => {
                    self.page += 1;
                    return Ok(Some(Page {
                        league_id,
                        number,
                        matches: contents.matches,
                    }));
                }
                Err(e) if first => {
                    self.league_idx = self.leagues.len();
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        feed = %self.feed,
                        league_id,
                        page = number,
                        "Page fetch failed, stopping league: {}",
                        e
                    );
                    self.failures.push(PageFailure {
                        league_id,
                        page: number,
                        error: e,
                    });
                    self.next_league();
                }
            }
        }
    }

    fn next_league(&mut self) {
        self.league_idx += 1;
        self.page = 1;
    }

    pub fn failures(&self) -> &[PageFailure] {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttemptError;
    use crate::testing::{self, query_param, ScriptedTransport};
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn page_of(ids: &[i64]) -> serde_json::Value {
        json!({"success": 1, "results": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>()})
    }

    fn param(url: &reqwest::Url, key: &str) -> i64 {
        query_param(url, key).unwrap().parse().unwrap()
    }

    async fn drain(p: &mut Paginator<'_>) -> Vec<(i64, u32, usize)> {
        let mut seen = Vec::new();
        while let Some(page) = p.next_page().await.unwrap() {
            seen.push((page.league_id, page.number, page.matches.len()));
        }
        seen
    }

    #[tokio::test]
    async fn stops_at_first_empty_page() {
        let transport = ScriptedTransport::new(|url| {
            Ok(match param(url, "page") {
                1 => page_of(&[1, 2]),
                2 => page_of(&[3]),
                _ => page_of(&[]),
            })
        });
        let client = testing::client(transport.clone(), 1);
        let pacer = RequestPacer::unlimited();
        let mut p = Paginator::new(&client, &pacer, Feed::Ended, &[7], 10);

        assert_eq!(drain(&mut p).await, vec![(7, 1, 2), (7, 2, 1)]);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn never_exceeds_page_ceiling() {
        let transport = ScriptedTransport::new(|url| Ok(page_of(&[param(url, "page")])));
        let client = testing::client(transport.clone(), 1);
        let pacer = RequestPacer::unlimited();
        let mut p = Paginator::new(&client, &pacer, Feed::Upcoming, &[7], 3);

        assert_eq!(drain(&mut p).await.len(), 3);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn empty_page_ends_only_its_league() {
        let transport = ScriptedTransport::new(|url| {
            Ok(match (param(url, "league_id"), param(url, "page")) {
                (1, 1) => page_of(&[]),
                (2, p) if p <= 2 => page_of(&[p * 10]),
                _ => page_of(&[]),
            })
        });
        let client = testing::client(transport.clone(), 1);
        let pacer = RequestPacer::unlimited();
        let mut p = Paginator::new(&client, &pacer, Feed::Upcoming, &[1, 2], 5);

        assert_eq!(drain(&mut p).await, vec![(2, 1, 1), (2, 2, 1)]);
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn first_fetch_failure_is_returned() {
        let transport = ScriptedTransport::new(|_| Err(AttemptError::Status(500)));
        let client = testing::client(transport.clone(), 2);
        let pacer = RequestPacer::unlimited();
        let mut p = Paginator::new(&client, &pacer, Feed::Ended, &[1, 2], 5);

        let err = p.next_page().await.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(p.next_page().await.unwrap().is_none());
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn later_failure_moves_to_next_league() {
        let transport = ScriptedTransport::new(|url| {
            match (param(url, "league_id"), param(url, "page")) {
                (1, 1) => Ok(page_of(&[1])),
                (1, _) => Err(AttemptError::Transport("reset".into())),
                (2, 1) => Ok(page_of(&[2])),
                _ => Ok(page_of(&[])),
            }
        });
        let client = testing::client(transport.clone(), 1);
        let pacer = RequestPacer::unlimited();
        let mut p = Paginator::new(&client, &pacer, Feed::Ended, &[1, 2], 5);

        assert_eq!(drain(&mut p).await, vec![(1, 1, 1), (2, 1, 1)]);
        assert_eq!(p.failures().len(), 1);
        assert_eq!(p.failures()[0].league_id, 1);
        assert_eq!(p.failures()[0].page, 2);
    }

    #[tokio::test]
    async fn page_with_only_unusable_records_does_not_end_league() {
        let transport = ScriptedTransport::new(|url| {
            Ok(match param(url, "page") {
                1 => json!({"results": [{"name": "no id"}]}),
                2 => page_of(&[5]),
                _ => page_of(&[]),
            })
        });
        let client = testing::client(transport.clone(), 1);
        let pacer = RequestPacer::unlimited();
        let mut p = Paginator::new(&client, &pacer, Feed::Ended, &[7], 10);

        assert_eq!(drain(&mut p).await, vec![(7, 1, 0), (7, 2, 1)]);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn page_fetches_are_spaced_by_the_pacer_interval() {
        let interval = Duration::from_millis(60);
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let recorder = stamps.clone();
        let transport = ScriptedTransport::new(move |url| {
            recorder.lock().unwrap().push(Instant::now());
            Ok(match param(url, "page") {
                p @ 1..=3 => page_of(&[p]),
                _ => page_of(&[]),
            })
        });
        let client = testing::client(transport, 1);
        let pacer = RequestPacer::every(interval);
        let mut p = Paginator::new(&client, &pacer, Feed::Upcoming, &[7], 10);

        assert_eq!(drain(&mut p).await.len(), 3);

        let stamps = stamps.lock().unwrap();
        assert_eq!(stamps.len(), 4);
        for pair in stamps.windows(2) {
            // governor's clock granularity allows a sliver of slack.
            assert!(pair[1] - pair[0] >= interval - Duration::from_millis(5));
        }
    }
}
