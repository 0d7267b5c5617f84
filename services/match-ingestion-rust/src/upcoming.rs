//! Upcoming-match refresh: the table is emptied and rebuilt from one
//! snapshot of the upstream feed.

use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::FetchError;
use crate::pacing::RequestPacer;
use crate::paginate::Paginator;
use crate::report::IngestReport;
use crate::rows::{dedupe_by_id, UpcomingMatchRow};
use crate::store::{invoke_all, MatchStore};
use crate::upstream::{Feed, UpstreamClient};
use crate::wire::RawMatch;

pub struct UpcomingMatchReplacer {
    client: Arc<UpstreamClient>,
    page_pacer: Arc<RequestPacer>,
    store: Arc<dyn MatchStore>,
    offset: Duration,
    procedures: Vec<String>,
}

impl UpcomingMatchReplacer {
    pub fn new(
        client: Arc<UpstreamClient>,
        page_pacer: Arc<RequestPacer>,
        store: Arc<dyn MatchStore>,
        offset: Duration,
        procedures: Vec<String>,
    ) -> Self {
        Self {
            client,
            page_pacer,
            store,
            offset,
            procedures,
        }
    }

    pub fn rows(&self, matches: &[RawMatch]) -> Vec<UpcomingMatchRow> {
        dedupe_by_id(
            matches
                .iter()
                .map(|m| UpcomingMatchRow::from_raw(m, self.offset))
                .collect(),
            |r| r.id,
        )
    }

    /// Clear the table, then stream every page of every league into it.
    ///
    /// A failed clear is logged and the cycle continues on top of the stale
    /// rows. Each page is written as soon as it is fetched. The procedures run
    /// last, in order, each outcome collected into the report.
    pub async fn replace(&self, league_ids: &[i64], max_pages: u32) -> Result<IngestReport, FetchError> {
        match self.store.clear_upcoming().await {
            Ok(removed) => info!(removed, "Cleared upcoming matches"),
            Err(e) => error!("Failed to clear upcoming matches, continuing: {}", e),
        }

        let mut pager = Paginator::new(
            &self.client,
            &self.page_pacer,
            Feed::Upcoming,
            league_ids,
            max_pages,
        );
        let mut report = IngestReport::default();

        while let Some(page) = pager.next_page().await? {
            let rows = self.rows(&page.matches);
            let written = match self.store.upsert_upcoming(&rows).await {
                Ok(_) => true,
                Err(e) => {
                    error!(
                        league_id = page.league_id,
                        page = page.number,
                        "Failed to upsert upcoming matches: {}",
                        e
                    );
                    false
                }
            };
            report.record_page(page.matches, written);
        }
        report.failed_pages = pager.failures().len();
        report.procedures = invoke_all(self.store.as_ref(), &self.procedures).await;

        info!(
            total = report.total,
            pages = report.pages,
            failed_pages = report.failed_pages,
            "Upcoming refresh finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttemptError;
    use crate::store::MemoryStore;
    use crate::testing::{self, query_param, ScriptedTransport};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn replacer(transport: Arc<ScriptedTransport>, store: Arc<MemoryStore>) -> UpcomingMatchReplacer {
        UpcomingMatchReplacer::new(
            testing::client(transport, 1),
            Arc::new(RequestPacer::unlimited()),
            store,
            Duration::hours(2),
            vec!["update_upcoming_h2h".into(), "update_upcoming_stats".into()],
        )
    }

    fn single_page(ids: &'static [i64]) -> Arc<ScriptedTransport> {
        ScriptedTransport::new(move |url| {
            Ok(match query_param(url, "page").as_deref() {
                Some("1") => json!({"results": ids.iter().map(|id| json!({"id": id, "time": 1_700_000_000})).collect::<Vec<_>>()}),
                _ => json!({"results": []}),
            })
        })
    }

    #[tokio::test]
    async fn second_cycle_replaces_first() {
        let store = Arc::new(MemoryStore::new());

        replacer(single_page(&[1, 2, 3]), store.clone())
            .replace(&[22307], 3)
            .await
            .unwrap();
        assert_eq!(store.upcoming_ids().await, vec![1, 2, 3]);

        let report = replacer(single_page(&[7, 8]), store.clone())
            .replace(&[22307], 3)
            .await
            .unwrap();
        assert_eq!(store.upcoming_ids().await, vec![7, 8]);
        assert_eq!(report.total, 2);
        assert_eq!(
            report.matches.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![7, 8]
        );
    }

    #[tokio::test]
    async fn stored_time_carries_the_offset() {
        let store = Arc::new(MemoryStore::new());
        replacer(single_page(&[1]), store.clone())
            .replace(&[1], 1)
            .await
            .unwrap();

        let row = &store.upcoming().await[0];
        assert_eq!(row.match_time, chrono::DateTime::from_timestamp(1_700_007_200, 0));
    }

    #[tokio::test]
    async fn failed_clear_still_refreshes() {
        let store = Arc::new(MemoryStore::new());
        let stale: RawMatch = serde_json::from_value(json!({"id": 99})).unwrap();
        store
            .seed_upcoming(vec![UpcomingMatchRow::from_raw(&stale, Duration::hours(2))])
            .await;
        store.fail_clear(true).await;

        replacer(single_page(&[1]), store.clone())
            .replace(&[1], 2)
            .await
            .unwrap();

        assert_eq!(store.upcoming_ids().await, vec![1, 99]);
    }

    #[tokio::test]
    async fn procedures_run_in_order_despite_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_procedure("update_upcoming_h2h").await;

        let report = replacer(single_page(&[1]), store.clone())
            .replace(&[1], 2)
            .await
            .unwrap();

        let outcomes: Vec<(String, bool)> = report
            .procedures
            .iter()
            .map(|o| (o.procedure.clone(), o.ok))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("update_upcoming_h2h".to_string(), false),
                ("update_upcoming_stats".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn rejected_page_writes_do_not_stop_the_cycle() {
        let store = Arc::new(MemoryStore::new());
        store.fail_upcoming_writes(true).await;
        let transport = ScriptedTransport::new(|url| {
            Ok(match query_param(url, "page").as_deref() {
                Some("1") => json!({"results": [{"id": 1}, {"id": 2}]}),
                Some("2") => json!({"results": [{"id": 3}]}),
                _ => json!({"results": []}),
            })
        });

        let report = replacer(transport.clone(), store.clone())
            .replace(&[22307], 3)
            .await
            .unwrap();

        assert_eq!(transport.call_count(), 3);
        assert_eq!(report.pages, 2);
        assert_eq!(report.total, 3);
        assert_eq!(report.failed_writes, 2);
        assert!(store.upcoming_ids().await.is_empty());
        assert_eq!(
            store.invoked().await,
            vec!["update_upcoming_h2h", "update_upcoming_stats"]
        );
    }

    #[tokio::test]
    async fn first_fetch_failure_aborts_after_clearing() {
        let store = Arc::new(MemoryStore::new());
        let transport = ScriptedTransport::new(|_| Err(AttemptError::Status(502)));

        let result = replacer(transport, store.clone()).replace(&[1], 3).await;

        assert!(result.is_err());
        assert!(store.invoked().await.is_empty());
    }

    #[tokio::test]
    async fn each_page_is_written_before_the_next_fetch() {
        let store = Arc::new(MemoryStore::new());
        let seen_first_page = Arc::new(AtomicBool::new(false));
        let flag = seen_first_page.clone();
        let observer = store.clone();
        let transport = ScriptedTransport::new(move |url| {
            Ok(match query_param(url, "page").as_deref() {
                Some("1") => json!({"results": [{"id": 1}]}),
                Some("2") => {
                    // try_lock succeeds because the store is idle between pages.
                    let written = observer
                        .try_upcoming_ids()
                        .map(|ids| ids == vec![1])
                        .unwrap_or(false);
                    flag.store(written, Ordering::SeqCst);
                    json!({"results": []})
                }
                _ => json!({"results": []}),
            })
        });

        replacer(transport, store.clone()).replace(&[1], 3).await.unwrap();
        assert!(seen_first_page.load(Ordering::SeqCst));
    }
}
