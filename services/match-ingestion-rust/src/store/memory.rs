//! In-process store backing the unit and integration tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

use super::{is_valid_procedure_name, ConflictPolicy, MatchStore};
use crate::error::StoreError;
use crate::rows::{EndedMatchRow, UpcomingMatchRow};

#[derive(Default)]
struct Tables {
    ended: BTreeMap<i64, EndedMatchRow>,
    upcoming: BTreeMap<i64, UpcomingMatchRow>,
    invoked: Vec<String>,
    faults: Faults,
}

#[derive(Default)]
struct Faults {
    ended_writes: bool,
    upcoming_writes: bool,
    clear: bool,
    odds_writes: bool,
    reads: bool,
    procedures: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ended(&self) -> Vec<EndedMatchRow> {
        self.tables.lock().await.ended.values().cloned().collect()
    }

    pub async fn upcoming(&self) -> Vec<UpcomingMatchRow> {
        self.tables.lock().await.upcoming.values().cloned().collect()
    }

    pub async fn upcoming_ids(&self) -> Vec<i64> {
        self.tables.lock().await.upcoming.keys().copied().collect()
    }

    /// Non-blocking snapshot of the upcoming ids; `None` while a write holds the lock.
    pub fn try_upcoming_ids(&self) -> Option<Vec<i64>> {
        self.tables
            .try_lock()
            .ok()
            .map(|t| t.upcoming.keys().copied().collect())
    }

    /// Procedure names in call order, including failed calls.
    pub async fn invoked(&self) -> Vec<String> {
        self.tables.lock().await.invoked.clone()
    }

    pub async fn seed_upcoming(&self, rows: Vec<UpcomingMatchRow>) {
        let mut tables = self.tables.lock().await;
        for row in rows {
            tables.upcoming.insert(row.id, row);
        }
    }

    pub async fn fail_ended_writes(&self, fail: bool) {
        self.tables.lock().await.faults.ended_writes = fail;
    }

    pub async fn fail_upcoming_writes(&self, fail: bool) {
        self.tables.lock().await.faults.upcoming_writes = fail;
    }

    pub async fn fail_clear(&self, fail: bool) {
        self.tables.lock().await.faults.clear = fail;
    }

    pub async fn fail_odds_writes(&self, fail: bool) {
        self.tables.lock().await.faults.odds_writes = fail;
    }

    pub async fn fail_reads(&self, fail: bool) {
        self.tables.lock().await.faults.reads = fail;
    }

    pub async fn fail_procedure(&self, name: &str) {
        self.tables
            .lock()
            .await
            .faults
            .procedures
            .insert(name.to_string());
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn upsert_ended(
        &self,
        rows: &[EndedMatchRow],
        policy: ConflictPolicy,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.faults.ended_writes {
            return Err(StoreError::write("upsert_ended", "injected failure"));
        }

        let mut written = 0;
        for row in rows {
            match policy {
                ConflictPolicy::Overwrite => {
                    tables.ended.insert(row.id, row.clone());
                    written += 1;
                }
                ConflictPolicy::IgnoreDuplicates => {
                    if !tables.ended.contains_key(&row.id) {
                        tables.ended.insert(row.id, row.clone());
                        written += 1;
                    }
                }
            }
        }
        Ok(written)
    }

    async fn clear_upcoming(&self) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.faults.clear {
            return Err(StoreError::write("clear_upcoming", "injected failure"));
        }
        let removed = tables.upcoming.len() as u64;
        tables.upcoming.clear();
        Ok(removed)
    }

    async fn upsert_upcoming(&self, rows: &[UpcomingMatchRow]) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.faults.upcoming_writes {
            return Err(StoreError::write("upsert_upcoming", "injected failure"));
        }
        for row in rows {
            let min_odds = tables.upcoming.get(&row.id).and_then(|r| r.min_odds);
            tables.upcoming.insert(
                row.id,
                UpcomingMatchRow {
                    min_odds,
                    ..row.clone()
                },
            );
        }
        Ok(rows.len() as u64)
    }

    async fn set_min_odds(&self, id: i64, min_odds: f64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.faults.odds_writes {
            return Err(StoreError::write("set_min_odds", "injected failure"));
        }
        if let Some(row) = tables.upcoming.get_mut(&id) {
            row.min_odds = Some(min_odds);
        }
        Ok(())
    }

    async fn list_upcoming(&self) -> Result<Vec<UpcomingMatchRow>, StoreError> {
        let tables = self.tables.lock().await;
        if tables.faults.reads {
            return Err(StoreError::read("list_upcoming", "injected failure"));
        }
        let mut rows: Vec<_> = tables.upcoming.values().cloned().collect();
        rows.sort_by_key(|r| (r.match_time.is_none(), r.match_time, r.id));
        Ok(rows)
    }

    async fn list_ended(&self, limit: i64) -> Result<Vec<EndedMatchRow>, StoreError> {
        let tables = self.tables.lock().await;
        if tables.faults.reads {
            return Err(StoreError::read("list_ended", "injected failure"));
        }
        let mut rows: Vec<_> = tables.ended.values().cloned().collect();
        rows.sort_by_key(|r| std::cmp::Reverse((r.time, r.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn invoke(&self, procedure: &str) -> Result<(), StoreError> {
        if !is_valid_procedure_name(procedure) {
            return Err(StoreError::InvalidProcedure(procedure.to_string()));
        }
        let mut tables = self.tables.lock().await;
        tables.invoked.push(procedure.to_string());
        if tables.faults.procedures.contains(procedure) {
            return Err(StoreError::write("invoke", format!("{} raised", procedure)));
        }
        Ok(())
    }
}
