//! Persistence seam for the two match tables.

use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;

use crate::error::StoreError;
use crate::rows::{EndedMatchRow, UpcomingMatchRow};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgMatchStore;

/// What an upsert does with a row whose id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Replace the stored row; the latest score wins.
    #[default]
    Overwrite,
    /// Keep the stored row. Only safe when re-sent rows are identical.
    IgnoreDuplicates,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "ignore_duplicates" | "ignore" => Ok(ConflictPolicy::IgnoreDuplicates),
            other => Err(format!("unknown conflict policy `{}`", other)),
        }
    }
}

/// Result of one post-ingestion procedure call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProcedureOutcome {
    pub procedure: String,
    pub ok: bool,
    pub message: String,
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Bulk upsert keyed on `id`. Returns the number of rows written.
    async fn upsert_ended(
        &self,
        rows: &[EndedMatchRow],
        policy: ConflictPolicy,
    ) -> Result<u64, StoreError>;

    /// Delete every upcoming row. Returns the number removed.
    async fn clear_upcoming(&self) -> Result<u64, StoreError>;

    /// Bulk upsert keyed on `id`, always overwriting. Never touches `min_odds`.
    async fn upsert_upcoming(&self, rows: &[UpcomingMatchRow]) -> Result<u64, StoreError>;

    async fn set_min_odds(&self, id: i64, min_odds: f64) -> Result<(), StoreError>;

    /// Upcoming rows ordered by scheduled time.
    async fn list_upcoming(&self) -> Result<Vec<UpcomingMatchRow>, StoreError>;

    /// Most recent ended rows first.
    async fn list_ended(&self, limit: i64) -> Result<Vec<EndedMatchRow>, StoreError>;

    /// Run a server-side aggregation routine by name.
    async fn invoke(&self, procedure: &str) -> Result<(), StoreError>;
}

/// Call each procedure in order, collecting outcomes; a failure never stops the rest.
pub async fn invoke_all(store: &dyn MatchStore, procedures: &[String]) -> Vec<ProcedureOutcome> {
    let mut outcomes = Vec::with_capacity(procedures.len());
    for procedure in procedures {
        let outcome = match store.invoke(procedure).await {
            Ok(()) => {
                tracing::info!(procedure = %procedure, "Procedure completed");
                ProcedureOutcome {
                    procedure: procedure.clone(),
                    ok: true,
                    message: "ok".to_string(),
                }
            }
            Err(e) => {
                tracing::error!(procedure = %procedure, "Procedure failed: {}", e);
                ProcedureOutcome {
                    procedure: procedure.clone(),
                    ok: false,
                    message: e.to_string(),
                }
            }
        };
        outcomes.push(outcome);
    }
    outcomes
}

/// Accepts `name` or `schema.name`, each an unquoted SQL identifier.
pub fn is_valid_procedure_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_conflict_policies() {
        assert_eq!("overwrite".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Overwrite));
        assert_eq!(" Ignore_Duplicates ".parse::<ConflictPolicy>(), Ok(ConflictPolicy::IgnoreDuplicates));
        assert!("merge".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn procedure_names_must_be_identifiers() {
        assert!(is_valid_procedure_name("update_upcoming_stats"));
        assert!(is_valid_procedure_name("public.update_h2h"));
        assert!(!is_valid_procedure_name(""));
        assert!(!is_valid_procedure_name("1abc"));
        assert!(!is_valid_procedure_name("drop table x; --"));
        assert!(!is_valid_procedure_name("a.b.c"));
        assert!(!is_valid_procedure_name("stats()"));
    }

    #[tokio::test]
    async fn invoke_all_continues_past_failures() {
        let store = MemoryStore::new();
        store.fail_procedure("update_h2h").await;
        let procedures = vec!["update_h2h".to_string(), "update_stats".to_string()];

        let outcomes = invoke_all(&store, &procedures).await;

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].ok);
        assert!(outcomes[1].ok);
        assert_eq!(store.invoked().await, vec!["update_h2h", "update_stats"]);
    }
}
