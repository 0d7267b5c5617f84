//! Match Ingestion Service
//!
//! Syncs ended and upcoming table-tennis matches from the b365 API into
//! PostgreSQL and serves run triggers over HTTP.
//!
//! - Reads the API token and DB password from Docker secrets when the env
//!   vars are absent
//! - One run per table at a time, each bounded by a deadline

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{error, info};

use match_ingestion::config::Config;
use match_ingestion::fetch::HttpTransport;
use match_ingestion::http;
use match_ingestion::service::IngestionService;
use match_ingestion::store::PgMatchStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("match_ingestion=info".parse()?),
        )
        .init();

    info!("Match Ingestion Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let store = PgMatchStore::connect_with_retry(&config.database_url, 5).await?;
    let transport = HttpTransport::new()?;
    let service = Arc::new(IngestionService::new(
        &config,
        Arc::new(store),
        Arc::new(transport),
    ));

    // Check if running in one-shot mode (manual trigger)
    if config.run_once {
        info!("Running in one-shot mode (RUN_ONCE=true)");
        return match service.startup_sync().await {
            Ok(()) => {
                info!("One-shot sync completed");
                Ok(())
            }
            Err(e) => {
                error!("One-shot sync failed: {:?}", e);
                Err(anyhow!(e))
            }
        };
    }

    if config.run_on_start {
        let startup = service.clone();
        tokio::spawn(async move {
            if let Err(e) = startup.startup_sync().await {
                error!("Startup sync failed: {}", e);
            }
        });
    }

    let app = http::router(service);
    let addr = format!("0.0.0.0:{}", config.http_port);
    info!("HTTP server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Handle shutdown gracefully
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}
