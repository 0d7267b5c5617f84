//! PostgreSQL implementation of [`MatchStore`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{info, warn};

use super::{is_valid_procedure_name, ConflictPolicy, MatchStore};
use crate::error::StoreError;
use crate::rows::{EndedMatchRow, SetPoints, UpcomingMatchRow, MAX_SETS};

const ENDED_COLUMNS: [&str; 23] = [
    "id",
    "sport_id",
    "time",
    "league_id",
    "league_name",
    "home_id",
    "home_name",
    "away_id",
    "away_name",
    "ss",
    "set_count",
    "match_date",
    "match_time",
    "set1_home",
    "set1_away",
    "set2_home",
    "set2_away",
    "set3_home",
    "set3_away",
    "set4_home",
    "set4_away",
    "set5_home",
    "set5_away",
];

/// `min_odds` is deliberately absent: only enrichment writes it.
const UPCOMING_COLUMNS: [&str; 11] = [
    "id",
    "sport_id",
    "time",
    "league_id",
    "league_name",
    "home_id",
    "home_name",
    "away_id",
    "away_name",
    "match_date",
    "match_time",
];

fn overwrite_clause(columns: &[&str]) -> String {
    let assignments: Vec<String> = columns
        .iter()
        .filter(|c| **c != "id")
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect();
    format!(" ON CONFLICT (id) DO UPDATE SET {}", assignments.join(", "))
}

pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
            {
                Ok(pool) => {
                    info!("Connected to PostgreSQL");
                    return Ok(Self::new(pool));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(anyhow!(
                            "Failed to connect to database after {} attempts: {}",
                            max_retries,
                            e
                        ));
                    }
                    warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }
}

fn ended_from_row(row: &PgRow) -> Result<EndedMatchRow, sqlx::Error> {
    let mut sets = [SetPoints::default(); MAX_SETS];
    for (i, set) in sets.iter_mut().enumerate() {
        set.home = row.try_get(format!("set{}_home", i + 1).as_str())?;
        set.away = row.try_get(format!("set{}_away", i + 1).as_str())?;
    }

    Ok(EndedMatchRow {
        id: row.try_get("id")?,
        sport_id: row.try_get("sport_id")?,
        time: row.try_get("time")?,
        league_id: row.try_get("league_id")?,
        league_name: row.try_get("league_name")?,
        home_id: row.try_get("home_id")?,
        home_name: row.try_get("home_name")?,
        away_id: row.try_get("away_id")?,
        away_name: row.try_get("away_name")?,
        ss: row.try_get("ss")?,
        set_count: row.try_get("set_count")?,
        match_date: row.try_get("match_date")?,
        match_time: row.try_get("match_time")?,
        sets,
    })
}

fn upcoming_from_row(row: &PgRow) -> Result<UpcomingMatchRow, sqlx::Error> {
    Ok(UpcomingMatchRow {
        id: row.try_get("id")?,
        sport_id: row.try_get("sport_id")?,
        time: row.try_get("time")?,
        league_id: row.try_get("league_id")?,
        league_name: row.try_get("league_name")?,
        home_id: row.try_get("home_id")?,
        home_name: row.try_get("home_name")?,
        away_id: row.try_get("away_id")?,
        away_name: row.try_get("away_name")?,
        match_date: row.try_get("match_date")?,
        match_time: row.try_get("match_time")?,
        min_odds: row.try_get("min_odds")?,
    })
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn upsert_ended(
        &self,
        rows: &[EndedMatchRow],
        policy: ConflictPolicy,
    ) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO ended_matches ({}) ",
            ENDED_COLUMNS.join(", ")
        ));
        qb.push_values(rows, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.sport_id)
                .push_bind(row.time)
                .push_bind(row.league_id)
                .push_bind(row.league_name.clone())
                .push_bind(row.home_id)
                .push_bind(row.home_name.clone())
                .push_bind(row.away_id)
                .push_bind(row.away_name.clone())
                .push_bind(row.ss.clone())
                .push_bind(row.set_count)
                .push_bind(row.match_date)
                .push_bind(row.match_time);
            for set in &row.sets {
                b.push_bind(set.home).push_bind(set.away);
            }
        });
        match policy {
            ConflictPolicy::Overwrite => qb.push(overwrite_clause(&ENDED_COLUMNS)),
            ConflictPolicy::IgnoreDuplicates => qb.push(" ON CONFLICT (id) DO NOTHING"),
        };

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::write("upsert_ended", e))?;
        Ok(result.rows_affected())
    }

    async fn clear_upcoming(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM upcoming_matches")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::write("clear_upcoming", e))?;
        Ok(result.rows_affected())
    }

    async fn upsert_upcoming(&self, rows: &[UpcomingMatchRow]) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO upcoming_matches ({}) ",
            UPCOMING_COLUMNS.join(", ")
        ));
        qb.push_values(rows, |mut b, row| {
            b.push_bind(row.id)
                .push_bind(row.sport_id)
                .push_bind(row.time)
                .push_bind(row.league_id)
                .push_bind(row.league_name.clone())
                .push_bind(row.home_id)
                .push_bind(row.home_name.clone())
                .push_bind(row.away_id)
                .push_bind(row.away_name.clone())
                .push_bind(row.match_date)
                .push_bind(row.match_time);
        });
        qb.push(overwrite_clause(&UPCOMING_COLUMNS));

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::write("upsert_upcoming", e))?;
        Ok(result.rows_affected())
    }

    async fn set_min_odds(&self, id: i64, min_odds: f64) -> Result<(), StoreError> {
        sqlx::query("UPDATE upcoming_matches SET min_odds = $1 WHERE id = $2")
            .bind(min_odds)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::write("set_min_odds", e))?;
        Ok(())
    }

    async fn list_upcoming(&self) -> Result<Vec<UpcomingMatchRow>, StoreError> {
        let sql = format!(
            "SELECT {}, min_odds FROM upcoming_matches ORDER BY match_time ASC NULLS LAST, id",
            UPCOMING_COLUMNS.join(", ")
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::read("list_upcoming", e))?;
        rows.iter()
            .map(upcoming_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::read("list_upcoming", e))
    }

    async fn list_ended(&self, limit: i64) -> Result<Vec<EndedMatchRow>, StoreError> {
        let sql = format!(
            "SELECT {} FROM ended_matches ORDER BY time DESC NULLS LAST, id DESC LIMIT $1",
            ENDED_COLUMNS.join(", ")
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::read("list_ended", e))?;
        rows.iter()
            .map(ended_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::read("list_ended", e))
    }

    async fn invoke(&self, procedure: &str) -> Result<(), StoreError> {
        if !is_valid_procedure_name(procedure) {
            return Err(StoreError::InvalidProcedure(procedure.to_string()));
        }
        // Identifiers cannot be bound as parameters; the name was validated above.
        sqlx::query(&format!("SELECT {}()", procedure))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::write("invoke", e))?;
        Ok(())
    }
}
