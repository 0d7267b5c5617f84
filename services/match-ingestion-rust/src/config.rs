//! Service configuration.
//!
//! Secrets/config:
//! - Docker Compose: read from /run/secrets/*
//! - Container platforms without a secrets mount: read from env vars

use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::fetch::RetryPolicy;
use crate::odds::{MissingOddsPolicy, OddsSettings};
use crate::store::ConflictPolicy;
use crate::upstream::UpstreamSettings;

const DEFAULT_BASE_URL: &str = "https://api.b365api.com";
const DEFAULT_SECRETS_DIR: &str = "/run/secrets";

/// Everything a pipeline run needs beyond the upstream and the store.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub league_ids: Vec<i64>,
    pub ended_max_pages: u32,
    pub upcoming_max_pages: u32,
    pub ended_policy: ConflictPolicy,
    /// Added to scheduled start times of upcoming matches before storage.
    pub upcoming_offset: chrono::Duration,
    pub ended_procedures: Vec<String>,
    pub upcoming_procedures: Vec<String>,
    pub run_deadline: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            league_ids: vec![22307],
            ended_max_pages: 10,
            upcoming_max_pages: 3,
            ended_policy: ConflictPolicy::Overwrite,
            upcoming_offset: chrono::Duration::hours(2),
            ended_procedures: vec!["update_upcoming_stats".to_string()],
            upcoming_procedures: vec![
                "update_upcoming_h2h".to_string(),
                "update_upcoming_stats".to_string(),
            ],
            run_deadline: Duration::from_secs(900),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub upstream: UpstreamSettings,
    pub database_url: String,
    pub retry: RetryPolicy,
    pub requests_per_minute: u32,
    pub page_interval: Duration,
    pub pipeline: PipelineSettings,
    pub odds: OddsSettings,
    pub http_port: u16,
    /// Run ended ingestion and the upcoming refresh once at boot.
    pub run_on_start: bool,
    /// If true, run the startup sync and exit (no HTTP server)
    pub run_once: bool,
}

impl Config {
    /// Defaults for everything except the three values with no sensible default.
    pub fn with_defaults(base_url: Url, token: String, database_url: String) -> Self {
        Self {
            upstream: UpstreamSettings {
                base_url,
                token,
                sport_id: 92,
                per_page: 100,
            },
            database_url,
            retry: RetryPolicy::default(),
            requests_per_minute: 120,
            page_interval: Duration::from_millis(1000),
            pipeline: PipelineSettings::default(),
            odds: OddsSettings::default(),
            http_port: 3000,
            run_on_start: true,
            run_once: false,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok(), Path::new(DEFAULT_SECRETS_DIR))
    }

    /// Build from an arbitrary variable source, reading missing secrets
    /// from files under `secrets_dir`.
    pub fn from_lookup<F>(lookup: F, secrets_dir: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let token = match vars.raw("B365_API_TOKEN") {
            Some(v) if !v.trim().is_empty() => v.trim().to_string(),
            Some(_) => return Err(anyhow!("B365_API_TOKEN is set but empty")),
            None => read_secret_file(&secrets_dir.join("b365_api_token"), "b365_api_token")?,
        };
        reject_placeholder(&token)?;

        let database_url = match vars.raw("DATABASE_URL") {
            Some(v) if !v.trim().is_empty() => v,
            Some(_) => return Err(anyhow!("DATABASE_URL is set but empty")),
            None => {
                let db_user = vars.or("DB_USER", "matches");
                let db_name = vars.or("DB_NAME", "matches");
                let db_host = vars.or("DB_HOST", "postgres");
                let db_port = vars.or("DB_PORT", "5432");
                let db_password = match vars.raw("DB_PASSWORD") {
                    Some(v) if !v.trim().is_empty() => v,
                    _ => read_secret_file(&secrets_dir.join("db_password"), "db_password")?,
                };
                format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    db_user, db_password, db_host, db_port, db_name
                )
            }
        };

        let base_url = vars.or("B365_BASE_URL", DEFAULT_BASE_URL);
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("B365_BASE_URL is not a valid URL: {}", base_url))?;

        let mut config = Self::with_defaults(base_url, token, database_url);

        config.upstream.sport_id = vars.number("SPORT_ID", config.upstream.sport_id);
        config.upstream.per_page = vars.number("PER_PAGE", config.upstream.per_page);

        config.retry = RetryPolicy {
            max_attempts: vars.number("FETCH_MAX_ATTEMPTS", config.retry.max_attempts).max(1),
            base_delay: Duration::from_millis(vars.number("FETCH_BASE_DELAY_MS", 1000)),
        };
        config.requests_per_minute = vars.number("UPSTREAM_REQUESTS_PER_MINUTE", 120);
        config.page_interval = Duration::from_millis(vars.number("PAGE_INTERVAL_MS", 1000));

        let pipeline = &mut config.pipeline;
        if let Some(leagues) = vars.raw("LEAGUE_IDS") {
            let ids = parse_league_ids(&leagues)?;
            if !ids.is_empty() {
                pipeline.league_ids = ids;
            }
        }
        pipeline.ended_max_pages = vars.number("ENDED_MAX_PAGES", pipeline.ended_max_pages);
        pipeline.upcoming_max_pages = vars.number("UPCOMING_MAX_PAGES", pipeline.upcoming_max_pages);
        let offset_hours: i64 = vars.number("UPCOMING_OFFSET_HOURS", 2);
        if !(1..=24).contains(&offset_hours) {
            return Err(anyhow!(
                "UPCOMING_OFFSET_HOURS must be between 1 and 24, got {}",
                offset_hours
            ));
        }
        pipeline.upcoming_offset = chrono::Duration::hours(offset_hours);
        if let Some(policy) = vars.raw("ENDED_CONFLICT_POLICY") {
            pipeline.ended_policy = policy
                .parse::<ConflictPolicy>()
                .map_err(|e| anyhow!("ENDED_CONFLICT_POLICY: {}", e))?;
        }
        if let Some(list) = vars.raw("ENDED_PROCEDURES") {
            pipeline.ended_procedures = split_list(&list);
        }
        if let Some(list) = vars.raw("UPCOMING_PROCEDURES") {
            pipeline.upcoming_procedures = split_list(&list);
        }
        pipeline.run_deadline = Duration::from_secs(vars.number("RUN_DEADLINE_SECONDS", 900));

        config.odds.bookmaker = vars.or("ODDS_BOOKMAKER", &config.odds.bookmaker);
        config.odds.market = vars.or("ODDS_MARKET", &config.odds.market);
        config.odds.missing = match vars.raw("MISSING_ODDS_SENTINEL") {
            Some(v) if !v.trim().is_empty() => {
                let sentinel = v
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("MISSING_ODDS_SENTINEL is not a number: {}", v))?;
                MissingOddsPolicy::Sentinel(sentinel)
            }
            _ => MissingOddsPolicy::LeaveUnset,
        };

        config.http_port = vars.number("PORT", config.http_port);
        config.run_on_start = vars.flag("RUN_ON_START", true);
        config.run_once = vars.flag("RUN_ONCE", false);

        Ok(config)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    /// Unparseable values fall back to the default.
    fn number<T: FromStr>(&self, key: &str, default: T) -> T {
        self.raw(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.raw(key) {
            Some(v) => v.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }
}

/// Read a secret from a Docker secret file.
fn read_secret_file(file_path: &Path, secret_name: &str) -> Result<String> {
    std::fs::read_to_string(file_path)
        .map(|s| s.trim().to_string())
        .with_context(|| {
            format!(
                "Secret file not found at {} ({}). Set the env var or mount the secret.",
                file_path.display(),
                secret_name
            )
        })
}

/// Prevent accidental use of sample/placeholder tokens.
fn reject_placeholder(token: &str) -> Result<()> {
    let lower = token.to_lowercase();
    if lower.contains("change_me") || lower.contains("your_") || lower.starts_with("sample") {
        return Err(anyhow!(
            "B365_API_TOKEN appears to be a placeholder value; replace with your real token"
        ));
    }
    Ok(())
}

fn parse_league_ids(value: &str) -> Result<Vec<i64>> {
    split_list(value)
        .iter()
        .map(|id| {
            id.parse::<i64>()
                .with_context(|| format!("LEAGUE_IDS contains a non-numeric id: {}", id))
        })
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
