use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::Result;
use crate::models::{ReportSummary, SolvedCounts, StoredStats, Student, WeeklyReport, year_display};

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(sqlx::Error::from)?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            roll_no   TEXT PRIMARY KEY,
            name      TEXT NOT NULL,
            username  TEXT NOT NULL,
            year      INTEGER NOT NULL,
            section   TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS student_stats (
            roll_no      TEXT PRIMARY KEY REFERENCES students(roll_no),
            easy         INTEGER NOT NULL DEFAULT 0,
            medium       INTEGER NOT NULL DEFAULT 0,
            hard         INTEGER NOT NULL DEFAULT 0,
            total        INTEGER NOT NULL DEFAULT 0,
            last_updated TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weekly_reports (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            year               INTEGER NOT NULL,
            section            TEXT,
            report_date        TIMESTAMP NOT NULL,
            week_start         TIMESTAMP NOT NULL,
            week_end           TIMESTAMP NOT NULL,
            total_students     INTEGER NOT NULL,
            zero_count         INTEGER NOT NULL,
            inconsistent_count INTEGER NOT NULL,
            active_count       INTEGER NOT NULL,
            data_json          TEXT NOT NULL,
            email_sent         BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts a small demo roster when the students table is empty, so a
/// fresh checkout serves a working dashboard. Returns whether seeding ran.
pub async fn seed_if_empty(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM students")
        .fetch_one(pool)
        .await?
        .get("n");
    if count > 0 {
        return Ok(false);
    }

    let roster = [
        ("310622148001", "Aallan Hrithick A S", "SRIbNNFCEY", 4, None),
        ("310622148002", "Achyuthnarayanan M", "higher studies", 4, None),
        ("310622148004", "Archana V C Nair", "Archana0521", 4, None),
        ("310622148007", "Bala Shivani P D", "bala_shivani", 4, None),
        ("310622148019", "Kaaviya B", "higher studies", 4, None),
        ("310622148032", "Rakhesh Krishna P", "rakheshkrishnap", 4, None),
        ("310623148001", "Aditi R", "aditi_codes", 3, None),
        ("310623148002", "Bharath S", "bharath_s_21", 3, None),
        ("310623148003", "Charulatha D", "charu_dev", 3, None),
        ("310623148004", "Dinesh Kumar V", "dineshkv05", 3, None),
    ];

    for (roll_no, name, username, year, section) in roster {
        insert_student(pool, roll_no, name, username, year, section).await?;
    }

    Ok(true)
}

async fn insert_student(
    pool: &SqlitePool,
    roll_no: &str,
    name: &str,
    username: &str,
    year: i64,
    section: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO students (roll_no, name, username, year, section)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (roll_no) DO UPDATE
        SET name = excluded.name,
            username = excluded.username,
            year = excluded.year,
            section = excluded.section
        "#,
    )
    .bind(roll_no)
    .bind(name)
    .bind(username)
    .bind(year)
    .bind(section)
    .execute(pool)
    .await?;
    Ok(())
}

/// Imports (or updates) roster rows from a CSV file with columns
/// `roll_no,name,username,year,section`. Returns the number of rows read.
pub async fn import_roster_csv(pool: &SqlitePool, csv_path: &Path) -> Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        roll_no: String,
        name: String,
        username: String,
        year: i64,
        section: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        insert_student(
            pool,
            &row.roll_no,
            &row.name,
            &row.username,
            row.year,
            row.section.as_deref(),
        )
        .await?;
        imported += 1;
    }

    Ok(imported)
}

/// Roster rows, optionally restricted to one cohort year, ordered by
/// roll number. An empty result is valid.
pub async fn fetch_students(pool: &SqlitePool, year: Option<i64>) -> Result<Vec<Student>> {
    let mut sql = String::from(
        "SELECT roll_no, name, username, year, section FROM students",
    );
    if year.is_some() {
        sql.push_str(" WHERE year = ?");
    }
    sql.push_str(" ORDER BY roll_no");

    let mut query = sqlx::query(&sql);
    if let Some(value) = year {
        query = query.bind(value);
    }

    let rows = query.fetch_all(pool).await?;
    let mut students = Vec::with_capacity(rows.len());
    for row in rows {
        students.push(Student {
            roll_no: row.get("roll_no"),
            name: row.get("name"),
            username: row.get("username"),
            year: row.get("year"),
            section: row.get("section"),
        });
    }

    Ok(students)
}

/// All stored counts keyed by roll number.
pub async fn fetch_stats_map(pool: &SqlitePool) -> Result<HashMap<String, StoredStats>> {
    let rows = sqlx::query(
        "SELECT roll_no, easy, medium, hard, total, last_updated FROM student_stats",
    )
    .fetch_all(pool)
    .await?;

    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let stats = StoredStats {
            roll_no: row.get("roll_no"),
            easy: row.get("easy"),
            medium: row.get("medium"),
            hard: row.get("hard"),
            total: row.get("total"),
            last_updated: row.get("last_updated"),
        };
        map.insert(stats.roll_no.clone(), stats);
    }

    Ok(map)
}

/// Writes freshly fetched counts. Solved totals only ever grow upstream,
/// so a smaller total means a flaky API response and the stored row wins.
pub async fn upsert_stats(
    pool: &SqlitePool,
    roll_no: &str,
    counts: &SolvedCounts,
    fetched_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO student_stats (roll_no, easy, medium, hard, total, last_updated)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (roll_no) DO UPDATE
        SET easy = excluded.easy,
            medium = excluded.medium,
            hard = excluded.hard,
            total = excluded.total,
            last_updated = excluded.last_updated
        WHERE excluded.total > student_stats.total
        "#,
    )
    .bind(roll_no)
    .bind(counts.easy)
    .bind(counts.medium)
    .bind(counts.hard)
    .bind(counts.total)
    .bind(fetched_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Distinct (year, section) pairs present in the roster, for report runs.
pub async fn distinct_year_sections(pool: &SqlitePool) -> Result<Vec<(i64, Option<String>)>> {
    let rows = sqlx::query("SELECT DISTINCT year, section FROM students ORDER BY year, section")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("year"), row.get("section")))
        .collect())
}

/// Persists a generated report and returns it with its assigned id.
pub async fn insert_report(pool: &SqlitePool, report: WeeklyReport) -> Result<WeeklyReport> {
    let result = sqlx::query(
        r#"
        INSERT INTO weekly_reports
        (year, section, report_date, week_start, week_end,
         total_students, zero_count, inconsistent_count, active_count,
         data_json, email_sent)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, FALSE)
        "#,
    )
    .bind(report.year)
    .bind(&report.section)
    .bind(report.report_date)
    .bind(report.week_start)
    .bind(report.week_end)
    .bind(report.total_students)
    .bind(report.zero_count)
    .bind(report.inconsistent_count)
    .bind(report.active_count)
    .bind(&report.data_json)
    .execute(pool)
    .await?;

    Ok(WeeklyReport {
        id: result.last_insert_rowid(),
        ..report
    })
}

pub async fn mark_report_emailed(pool: &SqlitePool, report_id: i64) -> Result<()> {
    sqlx::query("UPDATE weekly_reports SET email_sent = TRUE WHERE id = ?")
        .bind(report_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Stored report metadata, newest first.
pub async fn list_report_summaries(pool: &SqlitePool) -> Result<Vec<ReportSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, year, section, report_date, week_start, week_end,
               total_students, zero_count, inconsistent_count, active_count, email_sent
        FROM weekly_reports
        ORDER BY report_date DESC, id DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut summaries = Vec::with_capacity(rows.len());
    for row in rows {
        let year: i64 = row.get("year");
        let section: Option<String> = row.get("section");
        let mut label = year_display(year);
        if let Some(s) = &section {
            label.push_str(&format!(" ({})", s));
        }
        summaries.push(ReportSummary {
            id: row.get("id"),
            year,
            year_display: label,
            section,
            report_date: row.get("report_date"),
            week_start: row.get("week_start"),
            week_end: row.get("week_end"),
            total_students: row.get("total_students"),
            zero_count: row.get("zero_count"),
            inconsistent_count: row.get("inconsistent_count"),
            active_count: row.get("active_count"),
            email_sent: row.get("email_sent"),
        });
    }

    Ok(summaries)
}
