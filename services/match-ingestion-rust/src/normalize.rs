//! Field derivation shared by both tables.

use chrono::{DateTime, NaiveDate, Utc};

use crate::wire::RawMatch;

/// Values computed from a raw match, independent of the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalizedDerived {
    pub date: Option<NaiveDate>,
    pub timestamp: Option<DateTime<Utc>>,
    pub set_count: Option<i16>,
}

pub fn normalize(raw: &RawMatch) -> NormalizedDerived {
    let timestamp = raw.time.and_then(|secs| DateTime::from_timestamp(secs, 0));
    NormalizedDerived {
        date: timestamp.map(|t| t.date_naive()),
        timestamp,
        set_count: set_count(raw.ss.as_deref()),
    }
}

/// Number of sets played, read from the compact score.
///
/// Only decided best-of-five results are recognised; `"2-2"` stands for a
/// match that went to a fifth set. Anything else (walkovers, retirements,
/// partial scores) has no set count.
pub fn set_count(ss: Option<&str>) -> Option<i16> {
    match ss? {
        "0-3" | "3-0" => Some(3),
        "1-3" | "3-1" => Some(4),
        "2-3" | "3-2" => Some(5),
        "2-2" => Some(5),
        _ => None,
    }
}
