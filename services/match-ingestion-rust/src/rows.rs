//! Persisted row shapes for the two match tables.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::normalize::normalize;
use crate::wire::{RawMatch, SetScore};

/// Sets tracked per match.
pub const MAX_SETS: usize = 5;

/// Per-set points as stored, one pair per set.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq)]
pub struct SetPoints {
    pub home: Option<i32>,
    pub away: Option<i32>,
}

impl From<SetScore> for SetPoints {
    fn from(s: SetScore) -> Self {
        Self {
            home: s.home,
            away: s.away,
        }
    }
}

/// Historical result, keyed by `id`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct EndedMatchRow {
    pub id: i64,
    pub sport_id: Option<i64>,
    pub time: Option<i64>,
    pub league_id: Option<i64>,
    pub league_name: Option<String>,
    pub home_id: Option<i64>,
    pub home_name: Option<String>,
    pub away_id: Option<i64>,
    pub away_name: Option<String>,
    pub ss: Option<String>,
    pub set_count: Option<i16>,
    pub match_date: Option<NaiveDate>,
    pub match_time: Option<DateTime<Utc>>,
    pub sets: [SetPoints; MAX_SETS],
}

impl From<&RawMatch> for EndedMatchRow {
    fn from(m: &RawMatch) -> Self {
        let derived = normalize(m);
        let mut sets = [SetPoints::default(); MAX_SETS];
        for (i, slot) in sets.iter_mut().enumerate() {
            *slot = m.set_score(i + 1).into();
        }

        Self {
            id: m.id,
            sport_id: m.sport_id,
            time: m.time,
            league_id: m.league_id(),
            league_name: m.league_name(),
            home_id: m.home_id(),
            home_name: m.home_name(),
            away_id: m.away_id(),
            away_name: m.away_name(),
            ss: m.ss.clone(),
            set_count: derived.set_count,
            match_date: derived.date,
            match_time: derived.timestamp,
            sets,
        }
    }
}

/// Scheduled fixture from the latest refresh, keyed by `id`.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct UpcomingMatchRow {
    pub id: i64,
    pub sport_id: Option<i64>,
    pub time: Option<i64>,
    pub league_id: Option<i64>,
    pub league_name: Option<String>,
    pub home_id: Option<i64>,
    pub home_name: Option<String>,
    pub away_id: Option<i64>,
    pub away_name: Option<String>,
    pub match_date: Option<NaiveDate>,
    /// Scheduled instant shifted by the configured clock offset.
    pub match_time: Option<DateTime<Utc>>,
    pub min_odds: Option<f64>,
}

impl UpcomingMatchRow {
    /// `match_date` keeps the unshifted calendar date; only `match_time` is offset.
    pub fn from_raw(m: &RawMatch, offset: Duration) -> Self {
        let derived = normalize(m);
        Self {
            id: m.id,
            sport_id: m.sport_id,
            time: m.time,
            league_id: m.league_id(),
            league_name: m.league_name(),
            home_id: m.home_id(),
            home_name: m.home_name(),
            away_id: m.away_id(),
            away_name: m.away_name(),
            match_date: derived.date,
            match_time: derived.timestamp.map(|t| t + offset),
            min_odds: None,
        }
    }
}

/// Collapse rows sharing an id, keeping the last occurrence in page order.
pub fn dedupe_by_id<T, F>(rows: Vec<T>, id: F) -> Vec<T>
where
    F: Fn(&T) -> i64,
{
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<T> = rows
        .into_iter()
        .rev()
        .filter(|row| seen.insert(id(row)))
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawMatch {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn ended_row_flattens_set_scores() {
        let m = raw(json!({
            "id": "77",
            "sport_id": "92",
            "time": "1700000000",
            "league": {"id": "22307", "name": "Czech Liga Pro"},
            "home": {"id": "1", "name": "A"},
            "away": {"id": "2", "name": "B"},
            "ss": "3-1",
            "scores": {
                "1": {"home": "11", "away": "7"},
                "2": {"home": "8", "away": "11"},
                "3": {"home": "11", "away": "9"},
                "4": {"home": "12", "away": "10"}
            }
        }));

        let row = EndedMatchRow::from(&m);
        assert_eq!(row.id, 77);
        assert_eq!(row.set_count, Some(4));
        assert_eq!(row.league_name.as_deref(), Some("Czech Liga Pro"));
        assert_eq!(row.sets[0], SetPoints { home: Some(11), away: Some(7) });
        assert_eq!(row.sets[3], SetPoints { home: Some(12), away: Some(10) });
        assert_eq!(row.sets[4], SetPoints::default());
    }

    #[test]
    fn upcoming_row_shifts_only_the_instant() {
        // 23:30 UTC; a two hour shift crosses midnight but the date stays put.
        let m = raw(json!({"id": 8, "time": 1_700_004_600}));

        let row = UpcomingMatchRow::from_raw(&m, Duration::hours(2));
        assert_eq!(row.match_date, NaiveDate::from_ymd_opt(2023, 11, 14));
        assert_eq!(
            row.match_time,
            DateTime::from_timestamp(1_700_004_600 + 7200, 0)
        );
        assert_eq!(row.min_odds, None);
    }

    #[test]
    fn dedupe_keeps_last_occurrence_in_order() {
        let rows = vec![(1, "a"), (2, "b"), (1, "c"), (3, "d")];
        let out = dedupe_by_id(rows, |r| r.0);
        assert_eq!(out, vec![(2, "b"), (1, "c"), (3, "d")]);
    }
}
