use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::db;
use crate::error::Result;
use crate::fetcher::{FetchOutcome, StatsFetcher};
use crate::models::{SolvedCounts, StoredStats, Student, StudentRecord, year_display};

pub const LEADERBOARD_SIZE: usize = 5;

/// Upstream mirrors are shared public instances; keep the fan-out gentle.
const FETCH_CONCURRENCY: usize = 10;

/// Aggregate counters shown above the table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub count: usize,
    pub total_solved: i64,
    pub average: i64,
}

/// Builds the ResultSet for one request: roster rows (optionally one
/// cohort), each resolved against the upstream mirrors with the stored
/// counts as fallback, ordered by roll number.
pub async fn aggregate(
    pool: &SqlitePool,
    fetcher: &Arc<StatsFetcher>,
    year: Option<i64>,
) -> Result<Vec<StudentRecord>> {
    let students = db::fetch_students(pool, year).await?;
    let stored = db::fetch_stats_map(pool).await?;

    let semaphore = Arc::new(Semaphore::new(FETCH_CONCURRENCY));
    let mut tasks = JoinSet::new();

    for student in students {
        let cached = stored.get(&student.roll_no).cloned();
        let fetcher = Arc::clone(fetcher);
        let semaphore = Arc::clone(&semaphore);
        let pool = pool.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let outcome = fetcher.fetch(&student.username).await;
            let (record, fresh) = assemble_record(&student, outcome, cached.as_ref());

            if let Some(counts) = fresh {
                if let Err(err) = db::upsert_stats(&pool, &student.roll_no, &counts, Utc::now()).await {
                    log::warn!("failed to store counts for {}: {}", student.roll_no, err);
                }
            }

            record
        });
    }

    let mut records = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(record) => records.push(record),
            Err(err) => log::error!("stats task panicked: {}", err),
        }
    }

    records.sort_by(|a, b| a.roll_no.cmp(&b.roll_no));
    Ok(records)
}

/// Turns one fetch outcome into a dashboard row, plus the counts to
/// persist when the fetch produced fresh data.
///
/// Row totals are always derived from the three difficulty buckets, so a
/// ResultSet satisfies `total == easy + medium + hard` row by row.
pub fn assemble_record(
    student: &Student,
    outcome: FetchOutcome,
    stored: Option<&StoredStats>,
) -> (StudentRecord, Option<SolvedCounts>) {
    let base = |easy: i64, medium: i64, hard: i64, error: Option<String>, stale: bool| StudentRecord {
        roll_no: student.roll_no.clone(),
        actual_name: student.name.clone(),
        username: student.username.clone(),
        year: year_display(student.year),
        easy,
        medium,
        hard,
        total: easy + medium + hard,
        fetch_error: error,
        is_stale: stale,
    };

    match outcome {
        FetchOutcome::Counts(fresh) => {
            // The store only ever grows (see db::upsert_stats); a smaller
            // fresh total is a flaky mirror and the stored row wins.
            let shown = match stored {
                Some(old) if old.total > fresh.total => (old.easy, old.medium, old.hard),
                _ => (fresh.easy, fresh.medium, fresh.hard),
            };
            (base(shown.0, shown.1, shown.2, None, false), Some(fresh))
        }
        FetchOutcome::UserNotFound(message) => (base(0, 0, 0, Some(message), false), None),
        FetchOutcome::Unavailable => match stored {
            Some(old) => (base(old.easy, old.medium, old.hard, None, true), None),
            None => (base(0, 0, 0, None, false), None),
        },
    }
}

/// Top `limit` records by total solved, descending, with ties broken
/// ascending by roll number so the ordering is stable across runs.
pub fn leaderboard(records: &[StudentRecord], limit: usize) -> Vec<StudentRecord> {
    let mut ranked: Vec<StudentRecord> = records.to_vec();
    ranked.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.roll_no.cmp(&b.roll_no)));
    ranked.truncate(limit);
    ranked
}

pub fn summary(records: &[StudentRecord]) -> Summary {
    let count = records.len();
    let total_solved: i64 = records.iter().map(|r| r.total).sum();
    let average = if count == 0 {
        0
    } else {
        (total_solved as f64 / count as f64).round() as i64
    };
    Summary { count, total_solved, average }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_pool;
    use chrono::Utc;

    fn student(roll_no: &str, username: &str) -> Student {
        Student {
            roll_no: roll_no.to_string(),
            name: format!("Student {}", roll_no),
            username: username.to_string(),
            year: 3,
            section: None,
        }
    }

    fn record(roll_no: &str, easy: i64, medium: i64, hard: i64) -> StudentRecord {
        let (r, _) = assemble_record(
            &student(roll_no, "someone"),
            FetchOutcome::Counts(SolvedCounts {
                easy,
                medium,
                hard,
                total: easy + medium + hard,
            }),
            None,
        );
        r
    }

    fn stored(roll_no: &str, easy: i64, medium: i64, hard: i64) -> StoredStats {
        StoredStats {
            roll_no: roll_no.to_string(),
            easy,
            medium,
            hard,
            total: easy + medium + hard,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn fresh_counts_are_shown_and_persisted() {
        let old = stored("R1", 1, 1, 0);
        let fresh = SolvedCounts { easy: 5, medium: 3, hard: 1, total: 9 };
        let (record, persist) =
            assemble_record(&student("R1", "someone"), FetchOutcome::Counts(fresh), Some(&old));

        assert_eq!((record.easy, record.medium, record.hard, record.total), (5, 3, 1, 9));
        assert_eq!(record.fetch_error, None);
        assert!(!record.is_stale);
        assert_eq!(persist, Some(fresh));
    }

    #[test]
    fn stored_counts_win_over_a_regressed_fetch() {
        let old = stored("R1", 10, 5, 2);
        let fresh = SolvedCounts { easy: 1, medium: 0, hard: 0, total: 1 };
        let (record, _) =
            assemble_record(&student("R1", "someone"), FetchOutcome::Counts(fresh), Some(&old));

        assert_eq!(record.total, 17);
        assert_eq!(record.easy, 10);
    }

    #[test]
    fn unknown_username_zeroes_counts_and_sets_error() {
        let (record, persist) = assemble_record(
            &student("R1", "nosuchuser"),
            FetchOutcome::UserNotFound("user_not_found".to_string()),
            None,
        );
        assert_eq!(record.total, 0);
        assert_eq!(record.fetch_error.as_deref(), Some("user_not_found"));
        assert_eq!(persist, None);
    }

    #[test]
    fn outage_serves_stale_stored_counts() {
        let old = stored("R1", 4, 2, 1);
        let (record, persist) =
            assemble_record(&student("R1", "someone"), FetchOutcome::Unavailable, Some(&old));
        assert_eq!(record.total, 7);
        assert!(record.is_stale);
        assert_eq!(record.fetch_error, None);
        assert_eq!(persist, None);

        let (record, _) = assemble_record(&student("R2", "other"), FetchOutcome::Unavailable, None);
        assert_eq!(record.total, 0);
        assert!(!record.is_stale);
    }

    #[test]
    fn result_sets_keep_the_count_invariant() {
        let records = vec![record("R1", 5, 3, 1), record("R2", 0, 0, 0), record("R3", 2, 7, 4)];
        let sum_totals: i64 = records.iter().map(|r| r.total).sum();
        let sum_parts: i64 = records.iter().map(|r| r.easy + r.medium + r.hard).sum();
        assert_eq!(sum_totals, sum_parts);
    }

    #[test]
    fn leaderboard_is_capped_and_sorted() {
        let records = vec![
            record("R1", 10, 0, 0),
            record("R2", 0, 30, 0),
            record("R3", 0, 0, 20),
            record("R4", 5, 0, 0),
            record("R5", 0, 15, 0),
            record("R6", 25, 0, 0),
        ];

        let top = leaderboard(&records, LEADERBOARD_SIZE);
        assert_eq!(top.len(), 5);
        let totals: Vec<i64> = top.iter().map(|r| r.total).collect();
        assert_eq!(totals, vec![30, 25, 20, 15, 10]);

        let short = leaderboard(&records[..2], LEADERBOARD_SIZE);
        assert_eq!(short.len(), 2);
    }

    #[test]
    fn leaderboard_ties_break_by_roll_no() {
        let records = vec![
            record("B2", 0, 10, 0),
            record("A1", 10, 0, 0),
            record("C3", 0, 0, 10),
        ];
        let top = leaderboard(&records, LEADERBOARD_SIZE);
        let rolls: Vec<&str> = top.iter().map(|r| r.roll_no.as_str()).collect();
        assert_eq!(rolls, vec!["A1", "B2", "C3"]);
    }

    #[test]
    fn summary_rounds_the_mean() {
        let records = vec![record("R1", 1, 0, 0), record("R2", 2, 0, 0)];
        assert_eq!(
            summary(&records),
            Summary { count: 2, total_solved: 3, average: 2 }
        );

        assert_eq!(summary(&[]), Summary { count: 0, total_solved: 0, average: 0 });
    }

    #[tokio::test]
    async fn aggregate_orders_by_roll_no_without_touching_the_network() {
        // Sentinel usernames never leave the process, so a roster of them
        // exercises the full aggregation path offline.
        let pool = memory_pool().await;
        for roll in ["C3", "A1", "B2"] {
            sqlx::query("INSERT INTO students (roll_no, name, username, year) VALUES (?, ?, 'higher studies', 4)")
                .bind(roll)
                .bind(format!("Student {}", roll))
                .execute(&pool)
                .await
                .unwrap();
        }

        let fetcher = Arc::new(StatsFetcher::new().unwrap());
        let records = aggregate(&pool, &fetcher, None).await.unwrap();

        let rolls: Vec<&str> = records.iter().map(|r| r.roll_no.as_str()).collect();
        assert_eq!(rolls, vec!["A1", "B2", "C3"]);
        assert!(records.iter().all(|r| r.total == 0 && r.fetch_error.is_none()));
        assert_eq!(records[0].year, "4th Year");

        let none = aggregate(&pool, &fetcher, Some(2)).await.unwrap();
        assert!(none.is_empty());
    }
}
