//! Minimum bookmaker odds for upcoming matches.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::report::EnrichReport;
use crate::rows::UpcomingMatchRow;
use crate::store::MatchStore;
use crate::upstream::UpstreamClient;

/// What to store when a match has no quote for the configured market.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MissingOddsPolicy {
    /// Skip the write; `min_odds` keeps whatever it held (normally nothing).
    #[default]
    LeaveUnset,
    /// Write this value to mark "no market".
    Sentinel(f64),
}

#[derive(Debug, Clone)]
pub struct OddsSettings {
    pub bookmaker: String,
    pub market: String,
    pub missing: MissingOddsPolicy,
}

impl Default for OddsSettings {
    fn default() -> Self {
        Self {
            bookmaker: "Bet365".to_string(),
            market: "92_1".to_string(),
            missing: MissingOddsPolicy::LeaveUnset,
        }
    }
}

/// Smaller of the two sides, or whichever side is quoted.
pub fn min_odds(home: Option<f64>, away: Option<f64>) -> Option<f64> {
    match (home, away) {
        (Some(h), Some(a)) => Some(h.min(a)),
        (h, a) => h.or(a),
    }
}

pub struct OddsEnricher {
    client: Arc<UpstreamClient>,
    store: Arc<dyn MatchStore>,
    settings: OddsSettings,
}

impl OddsEnricher {
    pub fn new(client: Arc<UpstreamClient>, store: Arc<dyn MatchStore>, settings: OddsSettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    /// Look up each match's odds one at a time and store the minimum.
    ///
    /// Fetch failures count as "no odds" and never stop the pass; write
    /// failures are logged and counted.
    pub async fn enrich(&self, matches: &[UpcomingMatchRow]) -> EnrichReport {
        let mut report = EnrichReport::default();

        for m in matches {
            report.examined += 1;

            let sample = match self.client.odds_summary(m.id).await {
                Ok(summary) => summary.sample(&self.settings.bookmaker, &self.settings.market),
                Err(e) => {
                    warn!(event_id = m.id, "Odds fetch failed: {}", e);
                    report.fetch_failures += 1;
                    None
                }
            };

            let value = match sample.and_then(|s| min_odds(s.home_od, s.away_od)) {
                Some(v) => v,
                None => {
                    report.no_odds += 1;
                    match self.settings.missing {
                        MissingOddsPolicy::Sentinel(v) => v,
                        MissingOddsPolicy::LeaveUnset => {
                            debug!(event_id = m.id, "No odds for market {}", self.settings.market);
                            continue;
                        }
                    }
                }
            };

            match self.store.set_min_odds(m.id, value).await {
                Ok(()) => report.updated += 1,
                Err(e) => {
                    warn!(event_id = m.id, "Failed to store min odds: {}", e);
                    report.write_failures += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            updated = report.updated,
            no_odds = report.no_odds,
            "Odds enrichment finished"
        );
        report
    }
}
