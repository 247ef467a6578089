use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Username used in the roster for students who left for postgraduate
/// studies. These rows never hit the upstream APIs and are rendered as a
/// special (non-error) case.
pub const SENTINEL_USERNAME: &str = "higher studies";

/// A roster entry. Created by seeding or CSV import, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Student {
    pub roll_no: String,
    pub name: String,
    pub username: String,
    pub year: i64,
    pub section: Option<String>,
}

impl Student {
    pub fn is_sentinel(&self) -> bool {
        self.username.trim().eq_ignore_ascii_case(SENTINEL_USERNAME)
    }
}

/// Persisted problem counts for one student, keyed by roll number.
#[derive(Debug, Clone)]
pub struct StoredStats {
    pub roll_no: String,
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
    pub total: i64,
    pub last_updated: DateTime<Utc>,
}

/// Problem counts as returned by an upstream stats API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolvedCounts {
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
    pub total: i64,
}

/// One aggregated row of the dashboard. Ephemeral, built per request.
///
/// Invariant: `total == easy + medium + hard` unless `fetch_error` is set,
/// in which case every count is zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentRecord {
    pub roll_no: String,
    pub actual_name: String,
    pub username: String,
    pub year: String,
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
    pub total: i64,
    pub fetch_error: Option<String>,
    pub is_stale: bool,
}

/// A persisted weekly report row.
#[derive(Debug, Clone)]
pub struct WeeklyReport {
    pub id: i64,
    pub year: i64,
    pub section: Option<String>,
    pub report_date: DateTime<Utc>,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub total_students: i64,
    pub zero_count: i64,
    pub inconsistent_count: i64,
    pub active_count: i64,
    pub data_json: String,
    pub email_sent: bool,
}

impl WeeklyReport {
    pub fn year_display(&self) -> String {
        let mut label = year_display(self.year);
        if let Some(section) = &self.section {
            label.push_str(&format!(" ({})", section));
        }
        label
    }
}

/// Report metadata served by `/api/reports`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub id: i64,
    pub year: i64,
    pub year_display: String,
    pub section: Option<String>,
    pub report_date: DateTime<Utc>,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub total_students: i64,
    pub zero_count: i64,
    pub inconsistent_count: i64,
    pub active_count: i64,
    pub email_sent: bool,
}

/// "3" becomes "3rd Year", "4" becomes "4th Year" and so on.
pub fn year_display(year: i64) -> String {
    let suffix = match year {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    };
    format!("{}{} Year", year, suffix)
}

/// Parses a year filter as it arrives on the query string. Empty means
/// "all years"; otherwise the leading digits select one cohort
/// ("3rd Year" selects year 3). Anything without leading digits is
/// treated as no filter.
pub fn parse_year_filter(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_display_uses_ordinal_suffix() {
        assert_eq!(year_display(1), "1st Year");
        assert_eq!(year_display(2), "2nd Year");
        assert_eq!(year_display(3), "3rd Year");
        assert_eq!(year_display(4), "4th Year");
        assert_eq!(year_display(11), "11th Year");
    }

    #[test]
    fn year_filter_accepts_observed_values() {
        assert_eq!(parse_year_filter(""), None);
        assert_eq!(parse_year_filter("   "), None);
        assert_eq!(parse_year_filter("3rd Year"), Some(3));
        assert_eq!(parse_year_filter("4th Year"), Some(4));
        assert_eq!(parse_year_filter("2"), Some(2));
        assert_eq!(parse_year_filter("all"), None);
    }

    #[test]
    fn sentinel_matches_ignoring_case_and_padding() {
        let student = Student {
            roll_no: "310622148002".to_string(),
            name: "Achyuthnarayanan M".to_string(),
            username: " Higher Studies ".to_string(),
            year: 4,
            section: None,
        };
        assert!(student.is_sentinel());
    }
}
