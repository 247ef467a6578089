use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::db;
use crate::error::AppError;
use crate::exporter;
use crate::fetcher::StatsFetcher;
use crate::mailer::Mailer;
use crate::models::{ReportSummary, StudentRecord, parse_year_filter};
use crate::scheduler;
use crate::stats::{self, LEADERBOARD_SIZE, Summary};

/// Aggregated results are cached per year filter so the page, the API,
/// and the CSV download see the same data within a window.
const CACHE_TTL: Duration = Duration::from_secs(60);

pub struct AppState {
    pub pool: SqlitePool,
    pub fetcher: Arc<StatsFetcher>,
    pub mailer: Option<Mailer>,
    pub config: Config,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    fetched_at: Instant,
    records: Vec<StudentRecord>,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        fetcher: StatsFetcher,
        mailer: Option<Mailer>,
        config: Config,
    ) -> Self {
        AppState {
            pool,
            fetcher: Arc::new(fetcher),
            mailer,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn invalidate_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// The ResultSet for a year filter, from cache when fresh enough.
    pub async fn results_for(&self, year: Option<i64>) -> Result<Vec<StudentRecord>, AppError> {
        let key = year.map_or_else(|| "all".to_string(), |y| y.to_string());

        if let Some(entry) = self.cache.lock().unwrap().get(&key) {
            if entry.fetched_at.elapsed() < CACHE_TTL {
                return Ok(entry.records.clone());
            }
        }

        let records = stats::aggregate(&self.pool, &self.fetcher, year).await?;
        self.cache.lock().unwrap().insert(
            key,
            CacheEntry {
                fetched_at: Instant::now(),
                records: records.clone(),
            },
        );
        Ok(records)
    }
}

#[derive(Deserialize)]
struct StatsQuery {
    year: Option<String>,
}

#[derive(Serialize)]
struct StatsResponse {
    results: Vec<StudentRecord>,
    leaderboard: Vec<StudentRecord>,
    summary: Summary,
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let pool = db::connect(&config.database_url).await?;
    db::init_db(&pool).await?;

    if let Some(path) = &config.roster_csv {
        let imported = db::import_roster_csv(&pool, path).await?;
        log::info!("imported {} roster rows from {}", imported, path.display());
    }
    if db::seed_if_empty(&pool).await? {
        log::info!("empty roster, seeded demo students");
    }

    let mailer = Mailer::from_config(&config.smtp)?;
    if mailer.is_none() {
        log::info!("SMTP not configured, weekly reports will be stored but not emailed");
    }

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(pool, StatsFetcher::new()?, mailer, config));
    scheduler::spawn(Arc::clone(&state));

    let app = Router::new()
        .route("/", get(serve_dashboard))
        .route("/student/:roll_no", get(serve_student))
        .route("/api/stats", get(api_stats))
        .route("/api/student/:roll_no", get(api_student))
        .route("/api/reports", get(api_reports))
        .route("/download", get(download_csv))
        .nest_service("/static", ServeDir::new("src/static"))
        .with_state(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    log::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("./static/index.html"))
}

async fn serve_student(Path(_roll_no): Path<String>) -> Html<&'static str> {
    // The page reads the roll number from its own URL and asks
    // /api/student/:roll_no for the data.
    Html(include_str!("./static/student.html"))
}

async fn api_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, AppError> {
    let year = parse_year_filter(params.year.as_deref().unwrap_or(""));
    let results = state.results_for(year).await?;

    Ok(Json(StatsResponse {
        leaderboard: stats::leaderboard(&results, LEADERBOARD_SIZE),
        summary: stats::summary(&results),
        results,
    }))
}

async fn api_student(
    State(state): State<Arc<AppState>>,
    Path(roll_no): Path<String>,
) -> Result<Json<StudentRecord>, AppError> {
    let results = state.results_for(None).await?;
    results
        .into_iter()
        .find(|record| record.roll_no == roll_no)
        .map(Json)
        .ok_or(AppError::UnknownStudent(roll_no))
}

async fn api_reports(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReportSummary>>, AppError> {
    let summaries = db::list_report_summaries(&state.pool).await?;
    Ok(Json(summaries))
}

async fn download_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> Result<Response, AppError> {
    let year = parse_year_filter(params.year.as_deref().unwrap_or(""));
    let results = state.results_for(year).await?;
    let csv = exporter::to_csv(&results)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/csv")
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=leetcode_stats.csv",
        )
        .body(axum::body::Body::from(csv))
        .map_err(|err| AppError::Other(format!("failed to build CSV response: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmtpConfig;
    use crate::db::tests::memory_pool;

    fn test_config() -> Config {
        Config {
            bind_addr: "127.0.0.1:0".to_string(),
            database_url: "sqlite::memory:".to_string(),
            refresh_interval_minutes: 30,
            roster_csv: None,
            smtp: SmtpConfig {
                server: "smtp.gmail.com".to_string(),
                port: 587,
                username: String::new(),
                password: String::new(),
                hod_email: String::new(),
                from_email: String::new(),
            },
        }
    }

    async fn sentinel_state() -> AppState {
        let pool = memory_pool().await;
        sqlx::query(
            "INSERT INTO students (roll_no, name, username, year) VALUES ('R1', 'Someone', 'higher studies', 3)",
        )
        .execute(&pool)
        .await
        .unwrap();
        AppState::new(pool, StatsFetcher::new().unwrap(), None, test_config())
    }

    #[tokio::test]
    async fn results_are_cached_per_filter_until_invalidated() {
        let state = sentinel_state().await;

        let first = state.results_for(None).await.unwrap();
        assert_eq!(first.len(), 1);

        // A roster change is not visible while the cache entry is fresh.
        sqlx::query(
            "INSERT INTO students (roll_no, name, username, year) VALUES ('R2', 'Other', 'higher studies', 3)",
        )
        .execute(&state.pool)
        .await
        .unwrap();

        let cached = state.results_for(None).await.unwrap();
        assert_eq!(cached.len(), 1);

        // A different filter key bypasses the cached entry.
        let filtered = state.results_for(Some(3)).await.unwrap();
        assert_eq!(filtered.len(), 2);

        state.invalidate_cache();
        let refreshed = state.results_for(None).await.unwrap();
        assert_eq!(refreshed.len(), 2);
    }
}
