//! HTTP surface: health, run triggers and read-only listings.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

use crate::error::PipelineError;
use crate::report::{EnrichReport, IngestReport};
use crate::rows::{EndedMatchRow, UpcomingMatchRow};
use crate::service::IngestionService;
use crate::store::ProcedureOutcome;

const SERVICE_NAME: &str = "match-ingestion";

pub fn router(service: Arc<IngestionService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/matches", get(ended_handler))
        .route("/upcoming", get(upcoming_handler))
        .route("/odds", get(odds_handler))
        .route("/api/ended", get(list_ended_handler))
        .route("/api/upcoming", get(list_upcoming_handler))
        .with_state(service)
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PipelineError::RunInProgress(table) => (
                StatusCode::CONFLICT,
                format!("a run against {} is already in progress", table),
            ),
            PipelineError::DeadlineExceeded(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "run exceeded its deadline".to_string(),
            ),
            PipelineError::FirstFetch(_) => (
                StatusCode::BAD_GATEWAY,
                "upstream data unavailable".to_string(),
            ),
            PipelineError::StoreRead(e) => {
                error!("Store read failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database read failed".to_string(),
                )
            }
            PipelineError::TaskFailed(e) => {
                error!("Run task failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "run failed".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Trigger response: the report without the fetched records.
#[derive(Serialize)]
struct RunSummary {
    total: usize,
    pages: usize,
    failed_pages: usize,
    procedures: Vec<ProcedureOutcome>,
}

impl From<IngestReport> for RunSummary {
    fn from(report: IngestReport) -> Self {
        Self {
            total: report.total,
            pages: report.pages,
            failed_pages: report.failed_pages,
            procedures: report.procedures,
        }
    }
}

/// Health check handler
async fn health_handler(
    State(service): State<Arc<IngestionService>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let snapshot = service.health().snapshot().await;
    let errors = snapshot.consecutive_errors;

    let status = if errors > 5 { "degraded" } else { "ok" };

    let http_status = if errors > 10 {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        http_status,
        Json(json!({
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "status": status,
            "last_run": snapshot.last_run.map(|t| t.to_rfc3339()),
            "last_run_count": snapshot.last_run_count,
            "consecutive_errors": errors
        })),
    )
}

/// Drive a run on its own task so a dropped connection cannot cancel it
/// halfway; the handler only waits for the outcome.
async fn detached<T, F>(run: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(run)
        .await
        .map_err(|e| PipelineError::TaskFailed(e.to_string()))?
}

async fn ended_handler(
    State(service): State<Arc<IngestionService>>,
) -> Result<Json<RunSummary>, PipelineError> {
    let report = detached(async move { service.ingest_ended().await }).await?;
    Ok(Json(report.into()))
}

async fn upcoming_handler(
    State(service): State<Arc<IngestionService>>,
) -> Result<Json<RunSummary>, PipelineError> {
    let report = detached(async move { service.refresh_upcoming().await }).await?;
    Ok(Json(report.into()))
}

async fn odds_handler(
    State(service): State<Arc<IngestionService>>,
) -> Result<Json<EnrichReport>, PipelineError> {
    let report = detached(async move { service.enrich_odds().await }).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<i64>,
}

async fn list_ended_handler(
    State(service): State<Arc<IngestionService>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<EndedMatchRow>>, PipelineError> {
    Ok(Json(service.list_ended(params.limit).await?))
}

async fn list_upcoming_handler(
    State(service): State<Arc<IngestionService>>,
) -> Result<Json<Vec<UpcomingMatchRow>>, PipelineError> {
    Ok(Json(service.list_upcoming().await?))
}
