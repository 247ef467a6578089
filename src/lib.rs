/*!
# LeetBoard

A web dashboard that tracks LeetCode problem-solving statistics for a
department's students.

## Overview

The server keeps a roster of students with their LeetCode usernames in a
SQLite database, resolves each username against a chain of public stats
mirrors, and serves the aggregated counts as a filterable table with a
top-5 leaderboard, summary counters, and CSV export. Solved totals only
ever grow on LeetCode, so the store applies fetched counts monotonically
and serves the stored numbers when the mirrors are flaky.

## Architecture

- **Backend**: Rust, axum, sqlx (SQLite), reqwest
- **Frontend**: static HTML/CSS/JS served by the backend; the dashboard
  page talks to the JSON API and does its filtering client-side
- **Background jobs**: periodic stats refresh and Monday-morning weekly
  reports, optionally emailed to the HoD over SMTP

## Modules

- **config**: environment-driven runtime settings
- **models**: roster, stats, and report types plus year helpers
- **db**: SQLite schema, roster seed/import, stats and report queries
- **fetcher**: multi-source LeetCode stats client with retries and a
  circuit breaker per mirror
- **stats**: per-request aggregation, leaderboard, summary counters
- **exporter**: CSV serialization of a ResultSet
- **reports**: weekly zero/inconsistent/active bucketing and email HTML
- **mailer**: SMTP delivery of weekly reports
- **scheduler**: background refresh and report jobs
- **app**: routing, shared state, result cache
- **error**: the shared `AppError` type

## REST API Endpoints

- `GET /api/stats?year=` - aggregated records, leaderboard, summary
- `GET /api/student/:roll_no` - one student's record
- `GET /api/reports` - stored weekly report summaries
- `GET /download?year=` - CSV attachment matching the filtered table
*/

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod exporter;
pub mod fetcher;
pub mod mailer;
pub mod models;
pub mod reports;
pub mod scheduler;
pub mod stats;

pub use error::{AppError, Result};
pub use models::{SENTINEL_USERNAME, StudentRecord};
