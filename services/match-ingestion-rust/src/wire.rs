//! Upstream JSON shapes.
//!
//! The betting-data API is loose about types: ids, epoch times and point
//! totals arrive either as strings or as numbers, and empty maps are sometimes
//! sent as `[]`. Everything is normalised to typed optionals here so the rest
//! of the crate never touches `serde_json::Value`.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Odds stages in order of preference (most recent first).
const STAGE_PRIORITY: [&str; 3] = ["end", "kickoff", "start"];

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Other(IgnoredAny),
}

impl Loose {
    fn into_i64(self) -> Option<i64> {
        match self {
            Loose::Int(v) => Some(v),
            Loose::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(v as i64),
            Loose::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn into_f64(self) -> Option<f64> {
        let value = match self {
            Loose::Int(v) => v as f64,
            Loose::Float(v) => v,
            Loose::Text(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}

fn loose_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Loose::deserialize(d)?.into_i64())
}

fn loose_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    Ok(Loose::deserialize(d)?
        .into_i64()
        .and_then(|v| i32::try_from(v).ok()))
}

fn loose_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Loose::deserialize(d)?.into_f64())
}

fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Loose::deserialize(d)? {
        Loose::Text(s) if !s.trim().is_empty() => Some(s),
        Loose::Int(v) => Some(v.to_string()),
        _ => None,
    })
}

fn loose_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    Ok(match Loose::deserialize(d)? {
        Loose::Bool(b) => Some(b),
        other => other.into_i64().map(|v| v == 1),
    })
}

fn required_id<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Loose::deserialize(d)?
        .into_i64()
        .ok_or_else(|| serde::de::Error::custom("match id is missing or not numeric"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MapOrOther<T> {
    Map(HashMap<String, T>),
    Other(IgnoredAny),
}

fn map_or_empty<'de, D, T>(d: D) -> Result<HashMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match MapOrOther::deserialize(d)? {
        MapOrOther::Map(map) => map,
        MapOrOther::Other(_) => HashMap::new(),
    })
}

fn list_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    })
}

/// League or team reference.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Participant {
    #[serde(default, deserialize_with = "loose_i64")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "loose_string")]
    pub name: Option<String>,
}

/// Points won by each side in one set.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct SetScore {
    #[serde(default, deserialize_with = "loose_i32")]
    pub home: Option<i32>,
    #[serde(default, deserialize_with = "loose_i32")]
    pub away: Option<i32>,
}

/// One match object as delivered by the events feeds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RawMatch {
    #[serde(deserialize_with = "required_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "loose_i64")]
    pub sport_id: Option<i64>,
    /// Epoch seconds.
    #[serde(default, deserialize_with = "loose_i64")]
    pub time: Option<i64>,
    #[serde(default)]
    pub league: Option<Participant>,
    #[serde(default)]
    pub home: Option<Participant>,
    #[serde(default)]
    pub away: Option<Participant>,
    /// Compact final score, e.g. `"3-1"`.
    #[serde(default, deserialize_with = "loose_string")]
    pub ss: Option<String>,
    /// Per-set points keyed by set number (`"1"`..`"5"`).
    #[serde(default, deserialize_with = "map_or_empty")]
    pub scores: HashMap<String, SetScore>,
}

impl RawMatch {
    /// Score of set `number` (1-based), both sides absent when unreported.
    pub fn set_score(&self, number: usize) -> SetScore {
        self.scores
            .get(&number.to_string())
            .copied()
            .unwrap_or_default()
    }

    pub fn league_id(&self) -> Option<i64> {
        self.league.as_ref().and_then(|p| p.id)
    }

    pub fn league_name(&self) -> Option<String> {
        self.league.as_ref().and_then(|p| p.name.clone())
    }

    pub fn home_id(&self) -> Option<i64> {
        self.home.as_ref().and_then(|p| p.id)
    }

    pub fn home_name(&self) -> Option<String> {
        self.home.as_ref().and_then(|p| p.name.clone())
    }

    pub fn away_id(&self) -> Option<i64> {
        self.away.as_ref().and_then(|p| p.id)
    }

    pub fn away_name(&self) -> Option<String> {
        self.away.as_ref().and_then(|p| p.name.clone())
    }
}

/// Envelope of `/events/ended` and `/events/upcoming`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct MatchPage {
    #[serde(deserialize_with = "loose_flag")]
    pub success: Option<bool>,
    #[serde(deserialize_with = "loose_string")]
    pub error: Option<String>,
    #[serde(deserialize_with = "list_or_empty")]
    pub results: Vec<Value>,
}

impl MatchPage {
    /// Decode the page items, dropping records that cannot be keyed.
    pub fn into_matches(self) -> Vec<RawMatch> {
        if self.success == Some(false) {
            warn!(
                error = self.error.as_deref().unwrap_or("unknown"),
                "Upstream reported an unsuccessful page"
            );
        }

        self.results
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RawMatch>(item) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Skipping unusable match record: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Home/away decimal odds for one market sample.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct MarketOdds {
    #[serde(default, deserialize_with = "loose_f64")]
    pub home_od: Option<f64>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub away_od: Option<f64>,
}

#[derive(Debug, Default)]
pub struct StageOdds {
    pub markets: HashMap<String, MarketOdds>,
}

impl<'de> Deserialize<'de> for StageOdds {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        map_or_empty(d).map(|markets| StageOdds { markets })
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct BookmakerOdds {
    #[serde(deserialize_with = "map_or_empty")]
    pub odds: HashMap<String, StageOdds>,
}

/// Envelope of `/event/odds/summary`.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct OddsSummary {
    #[serde(deserialize_with = "loose_flag")]
    pub success: Option<bool>,
    #[serde(deserialize_with = "map_or_empty")]
    pub results: HashMap<String, BookmakerOdds>,
}

impl OddsSummary {
    /// Most recent sample of `market` quoted by `bookmaker` with at least one price.
    pub fn sample(&self, bookmaker: &str, market: &str) -> Option<MarketOdds> {
        if self.success != Some(true) {
            return None;
        }
        let book = self.results.get(bookmaker)?;
        STAGE_PRIORITY
            .iter()
            .filter_map(|stage| book.odds.get(*stage)?.markets.get(market).copied())
            .find(|o| o.home_od.is_some() || o.away_od.is_some())
    }
}
