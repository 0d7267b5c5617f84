use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of the most recent runs, shared with the health endpoint.
#[derive(Clone, Default)]
pub struct HealthState {
    pub last_run_time: Arc<RwLock<Option<DateTime<Utc>>>>,
    pub last_run_count: Arc<RwLock<usize>>,
    pub error_count: Arc<RwLock<usize>>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub last_run: Option<DateTime<Utc>>,
    pub last_run_count: usize,
    pub consecutive_errors: usize,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, count: usize) {
        *self.last_run_time.write().await = Some(Utc::now());
        *self.last_run_count.write().await = count;
        *self.error_count.write().await = 0;
    }

    pub async fn record_error(&self) {
        *self.error_count.write().await += 1;
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            last_run: *self.last_run_time.read().await,
            last_run_count: *self.last_run_count.read().await,
            consecutive_errors: *self.error_count.read().await,
        }
    }
}
