//! Ended-match ingestion: historical results upserted page by page.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{FetchError, StoreError};
use crate::pacing::RequestPacer;
use crate::paginate::Paginator;
use crate::report::IngestReport;
use crate::rows::{dedupe_by_id, EndedMatchRow};
use crate::store::{invoke_all, ConflictPolicy, MatchStore};
use crate::upstream::{Feed, UpstreamClient};
use crate::wire::RawMatch;

/// Writes one page of raw matches into the ended table.
pub struct EndedMatchUpserter {
    store: Arc<dyn MatchStore>,
    policy: ConflictPolicy,
}

impl EndedMatchUpserter {
    pub fn new(store: Arc<dyn MatchStore>, policy: ConflictPolicy) -> Self {
        Self { store, policy }
    }

    pub fn rows(matches: &[RawMatch]) -> Vec<EndedMatchRow> {
        dedupe_by_id(matches.iter().map(EndedMatchRow::from).collect(), |r| r.id)
    }

    /// One bulk write per page. A rejected batch is logged once and returned;
    /// callers carry on with the next page.
    pub async fn upsert(&self, matches: &[RawMatch]) -> Result<u64, StoreError> {
        if matches.is_empty() {
            return Ok(0);
        }
        let rows = Self::rows(matches);

        match self.store.upsert_ended(&rows, self.policy).await {
            Ok(written) => {
                debug!(rows = rows.len(), written, "Upserted ended matches");
                Ok(written)
            }
            Err(e) => {
                error!(rows = rows.len(), "Failed to upsert ended matches: {}", e);
                Err(e)
            }
        }
    }
}

pub struct EndedIngestion {
    client: Arc<UpstreamClient>,
    page_pacer: Arc<RequestPacer>,
    store: Arc<dyn MatchStore>,
    upserter: EndedMatchUpserter,
    procedures: Vec<String>,
}

impl EndedIngestion {
    pub fn new(
        client: Arc<UpstreamClient>,
        page_pacer: Arc<RequestPacer>,
        store: Arc<dyn MatchStore>,
        policy: ConflictPolicy,
        procedures: Vec<String>,
    ) -> Self {
        Self {
            client,
            page_pacer,
            upserter: EndedMatchUpserter::new(store.clone(), policy),
            store,
            procedures,
        }
    }

    /// Page through the ended feed of every league, upserting each page as
    /// it arrives, then run the post-ingestion procedures.
    pub async fn run(&self, league_ids: &[i64], max_pages: u32) -> Result<IngestReport, FetchError> {
        let mut pager = Paginator::new(
            &self.client,
            &self.page_pacer,
            Feed::Ended,
            league_ids,
            max_pages,
        );
        let mut report = IngestReport::default();

        while let Some(page) = pager.next_page().await? {
            let written = self.upserter.upsert(&page.matches).await.is_ok();
            report.record_page(page.matches, written);
        }
        report.failed_pages = pager.failures().len();
        report.procedures = invoke_all(self.store.as_ref(), &self.procedures).await;

        info!(
            total = report.total,
            pages = report.pages,
            failed_pages = report.failed_pages,
            failed_writes = report.failed_writes,
            "Ended ingestion finished"
        );
        Ok(report)
    }
}
