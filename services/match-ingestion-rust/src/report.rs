use serde::Serialize;

use crate::store::ProcedureOutcome;
use crate::wire::RawMatch;

/// Summary of one ingestion run over a match feed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// Records fetched across all pages.
    pub total: usize,
    pub pages: usize,
    /// Page fetches that failed after the first page and ended their league.
    pub failed_pages: usize,
    /// Pages whose store write was rejected.
    pub failed_writes: usize,
    pub procedures: Vec<ProcedureOutcome>,
    #[serde(skip)]
    pub matches: Vec<RawMatch>,
}

impl IngestReport {
    pub(crate) fn record_page(&mut self, matches: Vec<RawMatch>, written: bool) {
        self.pages += 1;
        self.total += matches.len();
        if !written {
            self.failed_writes += 1;
        }
        self.matches.extend(matches);
    }
}

/// Summary of one odds enrichment pass.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct EnrichReport {
    pub examined: usize,
    pub updated: usize,
    /// Matches without a usable quote, including failed fetches.
    pub no_odds: usize,
    pub fetch_failures: usize,
    pub write_failures: usize,
}
