//! Error taxonomy for the ingestion pipeline.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single HTTP attempt. Every variant is retryable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AttemptError {
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unreadable response body: {0}")]
    Body(String),
}

/// Upstream unreachable or non-success after the retry budget was spent.
#[derive(Debug, Clone, Error)]
#[error("fetching {endpoint} failed after {attempts} attempt(s): {last}")]
pub struct FetchError {
    pub endpoint: String,
    pub attempts: u32,
    #[source]
    pub last: AttemptError,
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store write `{operation}` rejected: {message}")]
    Write {
        operation: &'static str,
        message: String,
    },
    #[error("store read `{operation}` failed: {message}")]
    Read {
        operation: &'static str,
        message: String,
    },
    #[error("`{0}` is not a valid procedure name")]
    InvalidProcedure(String),
}

impl StoreError {
    pub fn write(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Write {
            operation,
            message: err.to_string(),
        }
    }

    pub fn read(operation: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Read {
            operation,
            message: err.to_string(),
        }
    }
}

/// Table a run holds exclusively while it is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Ended,
    Upcoming,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Ended => f.write_str("ended_matches"),
            Table::Upcoming => f.write_str("upcoming_matches"),
        }
    }
}

/// Errors that abort a whole pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("first upstream fetch failed: {0}")]
    FirstFetch(#[from] FetchError),
    #[error(transparent)]
    StoreRead(StoreError),
    #[error("a run against {0} is already in progress")]
    RunInProgress(Table),
    #[error("run exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
    /// The task driving the run panicked or was cancelled by the runtime.
    #[error("run task ended abnormally: {0}")]
    TaskFailed(String),
}
