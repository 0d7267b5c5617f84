//! Run control: one active run per table, a deadline per run, and the
//! health bookkeeping the HTTP surface reports.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::{Config, PipelineSettings};
use crate::ended::EndedIngestion;
use crate::error::{PipelineError, Table};
use crate::fetch::{RetryingFetcher, Transport};
use crate::health::HealthState;
use crate::odds::OddsEnricher;
use crate::pacing::RequestPacer;
use crate::report::{EnrichReport, IngestReport};
use crate::rows::{EndedMatchRow, UpcomingMatchRow};
use crate::store::MatchStore;
use crate::upcoming::UpcomingMatchReplacer;
use crate::upstream::UpstreamClient;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

pub struct IngestionService {
    settings: PipelineSettings,
    store: Arc<dyn MatchStore>,
    ended: EndedIngestion,
    upcoming: UpcomingMatchReplacer,
    odds: OddsEnricher,
    ended_lock: Mutex<()>,
    upcoming_lock: Mutex<()>,
    health: HealthState,
}

impl IngestionService {
    pub fn new(config: &Config, store: Arc<dyn MatchStore>, transport: Arc<dyn Transport>) -> Self {
        let request_pacer = Arc::new(RequestPacer::per_minute(config.requests_per_minute));
        let page_pacer = Arc::new(RequestPacer::every(config.page_interval));
        let fetcher = RetryingFetcher::new(transport, config.retry, request_pacer);
        let client = Arc::new(UpstreamClient::new(config.upstream.clone(), fetcher));
        let settings = config.pipeline.clone();

        Self {
            ended: EndedIngestion::new(
                client.clone(),
                page_pacer.clone(),
                store.clone(),
                settings.ended_policy,
                settings.ended_procedures.clone(),
            ),
            upcoming: UpcomingMatchReplacer::new(
                client.clone(),
                page_pacer,
                store.clone(),
                settings.upcoming_offset,
                settings.upcoming_procedures.clone(),
            ),
            odds: OddsEnricher::new(client, store.clone(), config.odds.clone()),
            settings,
            store,
            ended_lock: Mutex::new(()),
            upcoming_lock: Mutex::new(()),
            health: HealthState::new(),
        }
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    pub async fn ingest_ended(&self) -> Result<IngestReport, PipelineError> {
        let _guard = self
            .ended_lock
            .try_lock()
            .map_err(|_| PipelineError::RunInProgress(Table::Ended))?;
        let start = Instant::now();

        let result = self
            .with_deadline(async {
                Ok::<_, PipelineError>(self
                    .ended
                    .run(&self.settings.league_ids, self.settings.ended_max_pages)
                    .await?)
            })
            .await;

        self.record("ended ingestion", &result, |r| r.total, start).await;
        result
    }

    pub async fn refresh_upcoming(&self) -> Result<IngestReport, PipelineError> {
        let _guard = self
            .upcoming_lock
            .try_lock()
            .map_err(|_| PipelineError::RunInProgress(Table::Upcoming))?;
        let start = Instant::now();

        let result = self
            .with_deadline(async {
                Ok::<_, PipelineError>(self
                    .upcoming
                    .replace(&self.settings.league_ids, self.settings.upcoming_max_pages)
                    .await?)
            })
            .await;

        self.record("upcoming refresh", &result, |r| r.total, start).await;
        result
    }

    /// Enrich every stored upcoming match. Holds the upcoming-table guard so
    /// it never interleaves with a refresh.
    pub async fn enrich_odds(&self) -> Result<EnrichReport, PipelineError> {
        let _guard = self
            .upcoming_lock
            .try_lock()
            .map_err(|_| PipelineError::RunInProgress(Table::Upcoming))?;
        let start = Instant::now();

        let result = self
            .with_deadline(async {
                let matches = self
                    .store
                    .list_upcoming()
                    .await
                    .map_err(PipelineError::StoreRead)?;
                Ok::<_, PipelineError>(self.odds.enrich(&matches).await)
            })
            .await;

        self.record("odds enrichment", &result, |r| r.updated, start).await;
        result
    }

    /// Newest first. `limit` defaults to 100 and is clamped to 1..=1000.
    pub async fn list_ended(&self, limit: Option<i64>) -> Result<Vec<EndedMatchRow>, PipelineError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.store
            .list_ended(limit)
            .await
            .map_err(PipelineError::StoreRead)
    }

    pub async fn list_upcoming(&self) -> Result<Vec<UpcomingMatchRow>, PipelineError> {
        self.store
            .list_upcoming()
            .await
            .map_err(PipelineError::StoreRead)
    }

    /// Ended ingestion followed by the upcoming refresh. Both always run;
    /// the first failure is returned.
    pub async fn startup_sync(&self) -> Result<(), PipelineError> {
        info!("Running startup sync");
        let ended = self.ingest_ended().await.map(|_| ());
        let upcoming = self.refresh_upcoming().await.map(|_| ());
        ended.and(upcoming)
    }

    async fn with_deadline<T, F>(&self, run: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        let deadline = self.settings.run_deadline;
        match tokio::time::timeout(deadline, run).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::DeadlineExceeded(deadline)),
        }
    }

    async fn record<T>(
        &self,
        run: &str,
        result: &Result<T, PipelineError>,
        count: impl Fn(&T) -> usize,
        start: Instant,
    ) {
        let elapsed: Duration = start.elapsed();
        match result {
            Ok(report) => {
                let count = count(report);
                self.health.record_success(count).await;
                info!("{} completed: {} records in {:?}", run, count, elapsed);
            }
            Err(e @ PipelineError::DeadlineExceeded(_)) => {
                self.health.record_error().await;
                warn!("{} aborted after {:?}: {}", run, elapsed, e);
            }
            Err(e) => {
                self.health.record_error().await;
                error!("{} failed: {:?}", run, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttemptError;
    use crate::store::MemoryStore;
    use crate::testing::{query_param, ScriptedTransport};
    use reqwest::Url;
    use serde_json::json;

    fn config() -> Config {
        let mut config = Config::with_defaults(
            Url::parse("https://api.example.test").unwrap(),
            "test-token".to_string(),
            "postgresql://unused".to_string(),
        );
        config.retry.max_attempts = 1;
        config.retry.base_delay = Duration::from_millis(1);
        config.requests_per_minute = 0;
        config.page_interval = Duration::ZERO;
        config
    }

    fn feed() -> Arc<ScriptedTransport> {
        ScriptedTransport::new(|url| {
            if url.path().contains("odds") {
                return Ok(json!({"success": 1, "results": {"Bet365": {"odds": {"start": {"92_1": {"home_od": "1.5", "away_od": "2.0"}}}}}}));
            }
            Ok(match query_param(url, "page").as_deref() {
                Some("1") => json!({"results": [{"id": 10, "time": "1700000000", "ss": "3-1"}]}),
                _ => json!({"results": []}),
            })
        })
    }

    #[tokio::test]
    async fn startup_sync_fills_both_tables() {
        let store = Arc::new(MemoryStore::new());
        let service = IngestionService::new(&config(), store.clone(), feed());

        tokio_test::assert_ok!(service.startup_sync().await);

        assert_eq!(store.ended().await[0].set_count, Some(4));
        assert_eq!(store.upcoming_ids().await, vec![10]);
        assert_eq!(
            store.invoked().await,
            vec!["update_upcoming_stats", "update_upcoming_h2h", "update_upcoming_stats"]
        );
    }

    #[tokio::test]
    async fn enrichment_reads_the_stored_upcoming_rows() {
        let store = Arc::new(MemoryStore::new());
        let service = IngestionService::new(&config(), store.clone(), feed());
        service.refresh_upcoming().await.unwrap();

        let report = service.enrich_odds().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(store.upcoming().await[0].min_odds, Some(1.5));
    }

    #[tokio::test]
    async fn overlapping_run_on_the_same_table_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let service = IngestionService::new(&config(), store, feed());

        let _held = service.upcoming_lock.try_lock().unwrap();
        let err = service.enrich_odds().await.unwrap_err();
        assert!(matches!(err, PipelineError::RunInProgress(Table::Upcoming)));

        // The ended table is independent.
        tokio_test::assert_ok!(service.ingest_ended().await);
    }

    #[tokio::test]
    async fn first_fetch_failure_is_reported_and_counted() {
        let store = Arc::new(MemoryStore::new());
        let transport = ScriptedTransport::new(|_| Err(AttemptError::Status(503)));
        let service = IngestionService::new(&config(), store, transport);

        let err = service.ingest_ended().await.unwrap_err();

        assert!(matches!(err, PipelineError::FirstFetch(_)));
        assert_eq!(service.health().snapshot().await.consecutive_errors, 1);
    }

    #[tokio::test]
    async fn store_read_failure_aborts_enrichment() {
        let store = Arc::new(MemoryStore::new());
        store.fail_reads(true).await;
        let service = IngestionService::new(&config(), store, feed());

        let err = service.enrich_odds().await.unwrap_err();
        assert!(matches!(err, PipelineError::StoreRead(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_run_hits_the_deadline() {
        struct Stalled;

        #[async_trait::async_trait]
        impl Transport for Stalled {
            async fn get_json(&self, _url: &Url) -> Result<serde_json::Value, AttemptError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!({"results": []}))
            }
        }

        let mut config = config();
        config.pipeline.run_deadline = Duration::from_secs(5);
        let service = IngestionService::new(&config, Arc::new(MemoryStore::new()), Arc::new(Stalled));

        let err = service.refresh_upcoming().await.unwrap_err();
        assert!(matches!(err, PipelineError::DeadlineExceeded(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn list_limit_is_clamped() {
        let store = Arc::new(MemoryStore::new());
        let service = IngestionService::new(&config(), store, feed());
        service.ingest_ended().await.unwrap();

        assert_eq!(service.list_ended(Some(0)).await.unwrap().len(), 1);
        assert_eq!(service.list_ended(None).await.unwrap().len(), 1);
    }
}
