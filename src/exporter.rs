use crate::error::{AppError, Result};
use crate::models::StudentRecord;

/// Column order matches the dashboard table.
pub const CSV_HEADER: [&str; 8] = [
    "Roll Number",
    "Name",
    "LeetCode Username",
    "Year",
    "Easy Solved",
    "Medium Solved",
    "Hard Solved",
    "Total Solved",
];

/// Serializes a ResultSet to CSV, one row per student, in the order the
/// records arrive (the table's order).
pub fn to_csv(records: &[StudentRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for record in records {
        writer.write_record(&[
            record.roll_no.as_str(),
            record.actual_name.as_str(),
            record.username.as_str(),
            record.year.as_str(),
            &record.easy.to_string(),
            &record.medium.to_string(),
            &record.hard.to_string(),
            &record.total.to_string(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| AppError::Other(format!("CSV buffer error: {}", err)))?;
    String::from_utf8(bytes).map_err(|err| AppError::Other(format!("CSV was not UTF-8: {}", err)))
}
