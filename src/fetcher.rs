use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::Result;
use crate::models::{SENTINEL_USERNAME, SolvedCounts};

const TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: usize = 3;
const BACKOFF_DELAYS: [Duration; 3] = [
    Duration::from_millis(200),
    Duration::from_millis(400),
    Duration::from_millis(800),
];
const BREAKER_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(300);

/// Public LeetCode stats mirrors, tried in order of preference.
const API_SOURCES: [ApiSource; 4] = [
    ApiSource {
        name: "alfa-leetcode-vercel",
        base_url: "https://alfa-leetcode-api-blush.vercel.app",
        solved_endpoint: "/{username}/solved",
        parser: Parser::Alfa,
    },
    ApiSource {
        name: "alfa-leetcode-render",
        base_url: "https://alfa-leetcode-api.onrender.com",
        solved_endpoint: "/{username}/solved",
        parser: Parser::Alfa,
    },
    ApiSource {
        name: "leetcode-api-faisalshohag",
        base_url: "https://leetcode-api-faisalshohag.vercel.app",
        solved_endpoint: "/{username}",
        parser: Parser::Faisal,
    },
    ApiSource {
        name: "leetcode-stats-api",
        base_url: "https://leetcode-stats-api.herokuapp.com",
        solved_endpoint: "/{username}",
        parser: Parser::Stats,
    },
];

struct ApiSource {
    name: &'static str,
    base_url: &'static str,
    solved_endpoint: &'static str,
    parser: Parser,
}

impl ApiSource {
    fn url(&self, username: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            self.solved_endpoint.replace("{username}", username)
        )
    }
}

#[derive(Clone, Copy)]
enum Parser {
    Alfa,
    Stats,
    Faisal,
}

/// Result of asking the upstream mirrors about one username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Counts(SolvedCounts),
    /// The username does not resolve to a LeetCode account. Definitive,
    /// not retried.
    UserNotFound(String),
    /// Every source was down or rate limited; the caller should fall back
    /// to stored counts.
    Unavailable,
}

enum Parsed {
    Counts(SolvedCounts),
    UserError(String),
}

/// Counts a source as dead after repeated failures and skips it until a
/// cooldown elapses, so one dead mirror does not add its full retry
/// latency to every student.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<HashMap<&'static str, BreakerEntry>>,
}

struct BreakerEntry {
    failures: u32,
    last_failure: Instant,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_settings(BREAKER_THRESHOLD, BREAKER_COOLDOWN)
    }

    pub fn with_settings(threshold: u32, cooldown: Duration) -> Self {
        CircuitBreaker {
            threshold,
            cooldown,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_failure(&self, source: &'static str) {
        let mut state = self.state.lock().unwrap();
        let entry = state.entry(source).or_insert(BreakerEntry {
            failures: 0,
            last_failure: Instant::now(),
        });
        entry.failures += 1;
        entry.last_failure = Instant::now();
    }

    pub fn record_success(&self, source: &'static str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.get_mut(source) {
            entry.failures = 0;
        }
    }

    pub fn is_open(&self, source: &'static str) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(entry) = state.get_mut(source) else {
            return false;
        };
        if entry.failures < self.threshold {
            return false;
        }
        if entry.last_failure.elapsed() >= self.cooldown {
            // Half-open: let the next request probe the source again.
            entry.failures = 0;
            return false;
        }
        true
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct StatsFetcher {
    client: reqwest::Client,
    breaker: CircuitBreaker,
}

impl StatsFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .pool_max_idle_per_host(20)
            .build()?;
        Ok(StatsFetcher {
            client,
            breaker: CircuitBreaker::new(),
        })
    }

    /// Resolves one username against the mirror chain. The sentinel
    /// username and blank usernames short-circuit to zero counts.
    pub async fn fetch(&self, username: &str) -> FetchOutcome {
        let username = username.trim();
        if username.is_empty() || username.eq_ignore_ascii_case(SENTINEL_USERNAME) {
            return FetchOutcome::Counts(SolvedCounts::default());
        }

        for source in &API_SOURCES {
            if self.breaker.is_open(source.name) {
                log::debug!("skipping {}: circuit open", source.name);
                continue;
            }
            if let Some(outcome) = self.fetch_from(source, username).await {
                return outcome;
            }
        }

        log::warn!("all stats sources failed for {}", username);
        FetchOutcome::Unavailable
    }

    /// One source with retries. `None` means this source gave no usable
    /// answer and the next one should be tried.
    async fn fetch_from(&self, source: &ApiSource, username: &str) -> Option<FetchOutcome> {
        let url = source.url(username);

        for attempt in 0..MAX_RETRIES {
            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    self.breaker.record_failure(source.name);
                    log::debug!(
                        "[{}] request error for {} (attempt {}/{}): {}",
                        source.name, username, attempt + 1, MAX_RETRIES, err
                    );
                    backoff(attempt).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let body: Value = match response.json().await {
                    Ok(body) => body,
                    Err(err) => {
                        self.breaker.record_failure(source.name);
                        log::debug!("[{}] bad JSON for {}: {}", source.name, username, err);
                        return None;
                    }
                };
                return match parse_payload(source.parser, &body) {
                    Parsed::Counts(counts) => {
                        self.breaker.record_success(source.name);
                        Some(FetchOutcome::Counts(counts))
                    }
                    // The source answered; the account simply does not
                    // exist. No point asking the other mirrors.
                    Parsed::UserError(message) => Some(FetchOutcome::UserNotFound(message)),
                };
            }

            if status == reqwest::StatusCode::NOT_FOUND {
                return Some(FetchOutcome::UserNotFound("user_not_found".to_string()));
            }

            self.breaker.record_failure(source.name);
            if status.is_server_error() {
                backoff(attempt).await;
                continue;
            }

            log::debug!("[{}] unexpected status {} for {}", source.name, status, username);
            return None;
        }

        None
    }
}

async fn backoff(attempt: usize) {
    if attempt + 1 < MAX_RETRIES {
        tokio::time::sleep(BACKOFF_DELAYS[attempt]).await;
    }
}

fn parse_payload(parser: Parser, body: &Value) -> Parsed {
    match parser {
        Parser::Alfa => parse_alfa(body),
        Parser::Stats => parse_stats(body),
        Parser::Faisal => parse_faisal(body),
    }
}

fn count(body: &Value, key: &str) -> i64 {
    body.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn parse_alfa(body: &Value) -> Parsed {
    if let Some(errors) = body.get("errors") {
        let message = errors
            .get(0)
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("user_not_found");
        return Parsed::UserError(message.to_string());
    }
    Parsed::Counts(SolvedCounts {
        easy: count(body, "easySolved"),
        medium: count(body, "mediumSolved"),
        hard: count(body, "hardSolved"),
        total: count(body, "solvedProblem"),
    })
}

fn parse_stats(body: &Value) -> Parsed {
    if body.get("status").and_then(Value::as_str) == Some("error") {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("user_not_found");
        return Parsed::UserError(message.to_string());
    }
    Parsed::Counts(SolvedCounts {
        easy: count(body, "easySolved"),
        medium: count(body, "mediumSolved"),
        hard: count(body, "hardSolved"),
        total: count(body, "totalSolved"),
    })
}

fn parse_faisal(body: &Value) -> Parsed {
    if body.get("errors").is_some() || body.get("status").and_then(Value::as_str) == Some("error") {
        return Parsed::UserError("user_not_found".to_string());
    }
    let total = body
        .get("totalSolved")
        .or_else(|| body.get("solvedProblem"))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    Parsed::Counts(SolvedCounts {
        easy: count(body, "easySolved"),
        medium: count(body, "mediumSolved"),
        hard: count(body, "hardSolved"),
        total,
    })
}
