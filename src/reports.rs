use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db;
use crate::error::Result;
use crate::models::{StoredStats, Student, WeeklyReport};

/// Students below this all-time total count as inconsistent solvers.
pub const INCONSISTENT_THRESHOLD: i64 = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub roll_no: String,
    pub name: String,
    pub username: String,
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
    pub total: i64,
}

/// One cohort's students split by activity. Sentinel rows are excluded
/// from every bucket and only counted.
#[derive(Debug, Default, Serialize)]
pub struct ReportBuckets {
    pub zero_solvers: Vec<ReportEntry>,
    pub inconsistent_solvers: Vec<ReportEntry>,
    pub active_solvers: Vec<ReportEntry>,
    #[serde(skip)]
    pub excluded: usize,
}

/// Monday 00:00:00 through Sunday 23:59:59 of the week containing `now`,
/// in UTC.
pub fn week_boundaries(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_since_monday = now.date_naive().weekday().num_days_from_monday() as i64;
    let monday = now.date_naive() - Duration::days(days_since_monday);
    let week_start = monday.and_hms_opt(0, 0, 0).unwrap().and_utc();
    let week_end = week_start + Duration::days(6) + Duration::hours(23) + Duration::minutes(59)
        + Duration::seconds(59);
    (week_start, week_end)
}

pub fn bucketize(students: &[Student], stats: &HashMap<String, StoredStats>) -> ReportBuckets {
    let mut buckets = ReportBuckets::default();

    for student in students {
        if student.is_sentinel() {
            buckets.excluded += 1;
            continue;
        }

        let stored = stats.get(&student.roll_no);
        let entry = ReportEntry {
            roll_no: student.roll_no.clone(),
            name: student.name.clone(),
            username: student.username.clone(),
            easy: stored.map_or(0, |s| s.easy),
            medium: stored.map_or(0, |s| s.medium),
            hard: stored.map_or(0, |s| s.hard),
            total: stored.map_or(0, |s| s.total),
        };

        if entry.total == 0 {
            buckets.zero_solvers.push(entry);
        } else if entry.total < INCONSISTENT_THRESHOLD {
            buckets.inconsistent_solvers.push(entry);
        } else {
            buckets.active_solvers.push(entry);
        }
    }

    buckets.zero_solvers.sort_by(|a, b| a.roll_no.cmp(&b.roll_no));
    buckets.inconsistent_solvers.sort_by(|a, b| a.roll_no.cmp(&b.roll_no));
    buckets.active_solvers.sort_by(|a, b| a.roll_no.cmp(&b.roll_no));
    buckets
}

pub fn build_report(
    year: i64,
    section: Option<String>,
    buckets: &ReportBuckets,
    now: DateTime<Utc>,
) -> WeeklyReport {
    let (week_start, week_end) = week_boundaries(now);
    let data_json = serde_json::json!({
        "zero_solvers": buckets.zero_solvers,
        "inconsistent_solvers": buckets.inconsistent_solvers,
        "active_solvers": buckets.active_solvers,
        "threshold": INCONSISTENT_THRESHOLD,
    })
    .to_string();

    WeeklyReport {
        id: 0,
        year,
        section,
        report_date: now,
        week_start,
        week_end,
        total_students: (buckets.zero_solvers.len()
            + buckets.inconsistent_solvers.len()
            + buckets.active_solvers.len()) as i64,
        zero_count: buckets.zero_solvers.len() as i64,
        inconsistent_count: buckets.inconsistent_solvers.len() as i64,
        active_count: buckets.active_solvers.len() as i64,
        data_json,
        email_sent: false,
    }
}

/// Generates and stores one report per (year, section) pair in the
/// roster. Returns the stored reports with their buckets so the caller
/// can render emails without re-reading the store.
pub async fn generate_all(pool: &SqlitePool) -> Result<Vec<(WeeklyReport, ReportBuckets)>> {
    let students = db::fetch_students(pool, None).await?;
    let stats = db::fetch_stats_map(pool).await?;
    let now = Utc::now();

    let mut groups: BTreeMap<(i64, Option<String>), Vec<Student>> = BTreeMap::new();
    for student in students {
        groups
            .entry((student.year, student.section.clone()))
            .or_default()
            .push(student);
    }

    let mut reports = Vec::new();
    for ((year, section), members) in groups {
        let buckets = bucketize(&members, &stats);
        if buckets.zero_solvers.is_empty()
            && buckets.inconsistent_solvers.is_empty()
            && buckets.active_solvers.is_empty()
        {
            continue;
        }
        let report = build_report(year, section, &buckets, now);
        let stored = db::insert_report(pool, report).await?;
        reports.push((stored, buckets));
    }

    Ok(reports)
}

/// HTML body for the weekly report email.
pub fn render_email_html(report: &WeeklyReport, buckets: &ReportBuckets) -> String {
    let mut html = String::new();

    let _ = writeln!(html, "<html><body style=\"font-family: Arial, sans-serif; color: #333;\">");
    let _ = writeln!(html, "<h1>Weekly LeetCode Report</h1>");
    let _ = writeln!(
        html,
        "<p>{} | Week of {} &ndash; {}</p>",
        report.year_display(),
        report.week_start.format("%B %d, %Y"),
        report.week_end.format("%B %d, %Y"),
    );
    let _ = writeln!(
        html,
        "<p><strong>{}</strong> zero solvers &middot; <strong>{}</strong> inconsistent (&lt; {}) &middot; <strong>{}</strong> active</p>",
        report.zero_count, report.inconsistent_count, INCONSISTENT_THRESHOLD, report.active_count,
    );

    if !buckets.zero_solvers.is_empty() {
        let _ = writeln!(html, "<h3>Zero Solvers ({})</h3>", buckets.zero_solvers.len());
        let _ = writeln!(html, "<p>These students have not solved any problems yet.</p>");
        let _ = writeln!(html, "<table border=\"1\" cellpadding=\"6\" cellspacing=\"0\">");
        let _ = writeln!(html, "<tr><th>Roll No</th><th>Name</th><th>LeetCode Username</th></tr>");
        for entry in &buckets.zero_solvers {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                entry.roll_no, entry.name, entry.username
            );
        }
        let _ = writeln!(html, "</table>");
    }

    if !buckets.inconsistent_solvers.is_empty() {
        let _ = writeln!(
            html,
            "<h3>Inconsistent Solvers ({})</h3>",
            buckets.inconsistent_solvers.len()
        );
        let _ = writeln!(
            html,
            "<p>These students have solved fewer than {} problems.</p>",
            INCONSISTENT_THRESHOLD
        );
        let _ = writeln!(html, "<table border=\"1\" cellpadding=\"6\" cellspacing=\"0\">");
        let _ = writeln!(
            html,
            "<tr><th>Roll No</th><th>Name</th><th>LeetCode</th><th>Easy</th><th>Medium</th><th>Hard</th><th>Total</th></tr>"
        );
        for entry in &buckets.inconsistent_solvers {
            let _ = writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                entry.roll_no, entry.name, entry.username,
                entry.easy, entry.medium, entry.hard, entry.total
            );
        }
        let _ = writeln!(html, "</table>");
    }

    let _ = writeln!(
        html,
        "<p style=\"color: #888; font-size: 12px;\">Generated on {} | Total students: {}</p>",
        report.report_date.format("%B %d, %Y at %H:%M UTC"),
        report.total_students,
    );
    let _ = writeln!(html, "</body></html>");

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Weekday};

    fn student(roll_no: &str, username: &str, year: i64) -> Student {
        Student {
            roll_no: roll_no.to_string(),
            name: format!("Student {}", roll_no),
            username: username.to_string(),
            year,
            section: None,
        }
    }

    fn stats_with_total(roll_no: &str, total: i64) -> StoredStats {
        StoredStats {
            roll_no: roll_no.to_string(),
            easy: total,
            medium: 0,
            hard: 0,
            total,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn week_runs_monday_to_sunday() {
        // 2026-08-06 is a Thursday.
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 15, 30, 0).unwrap();
        let (start, end) = week_boundaries(now);

        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 8, 9, 23, 59, 59).unwrap());

        // A Monday is its own week start.
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 8, 0, 0).unwrap();
        assert_eq!(week_boundaries(monday).0, start);
    }

    #[test]
    fn buckets_split_on_the_threshold() {
        let students = vec![
            student("R1", "u1", 3),
            student("R2", "u2", 3),
            student("R3", "u3", 3),
            student("R4", "higher studies", 3),
            student("R5", "u5", 3),
        ];
        let mut stats = HashMap::new();
        stats.insert("R1".to_string(), stats_with_total("R1", 0));
        stats.insert("R2".to_string(), stats_with_total("R2", 4));
        stats.insert("R3".to_string(), stats_with_total("R3", 5));
        // R5 has no stored row at all: counts as zero.

        let buckets = bucketize(&students, &stats);
        let rolls = |entries: &[ReportEntry]| {
            entries.iter().map(|e| e.roll_no.clone()).collect::<Vec<_>>()
        };

        assert_eq!(rolls(&buckets.zero_solvers), vec!["R1", "R5"]);
        assert_eq!(rolls(&buckets.inconsistent_solvers), vec!["R2"]);
        assert_eq!(rolls(&buckets.active_solvers), vec!["R3"]);
        assert_eq!(buckets.excluded, 1);
    }

    #[test]
    fn report_counts_exclude_sentinel_rows() {
        let students = vec![
            student("R1", "u1", 4),
            student("R2", "higher studies", 4),
        ];
        let buckets = bucketize(&students, &HashMap::new());
        let report = build_report(4, None, &buckets, Utc::now());

        assert_eq!(report.total_students, 1);
        assert_eq!(report.zero_count, 1);
        assert_eq!(report.inconsistent_count, 0);
        assert_eq!(report.active_count, 0);
        assert_eq!(report.year_display(), "4th Year");
        assert!(report.data_json.contains("zero_solvers"));
    }

    #[test]
    fn email_body_lists_struggling_students() {
        let students = vec![student("R1", "u1", 3), student("R2", "u2", 3)];
        let mut stats = HashMap::new();
        stats.insert("R2".to_string(), stats_with_total("R2", 3));

        let buckets = bucketize(&students, &stats);
        let report = build_report(3, None, &buckets, Utc::now());
        let html = render_email_html(&report, &buckets);

        assert!(html.contains("3rd Year"));
        assert!(html.contains("Zero Solvers (1)"));
        assert!(html.contains("Inconsistent Solvers (1)"));
        assert!(html.contains("Student R1"));
        assert!(html.contains("Student R2"));
    }
}
