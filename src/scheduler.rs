use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Utc};

use crate::app::AppState;
use crate::db;
use crate::reports;
use crate::stats;

/// Weekly reports go out Monday at this UTC hour.
const WEEKLY_REPORT_HOUR: u32 = 8;

/// Starts the background jobs: a periodic full stats refresh and the
/// Monday-morning weekly reports.
pub fn spawn(state: Arc<AppState>) {
    let minutes = state.config.refresh_interval_minutes.max(1);
    log::info!("stats refresh scheduled every {} minutes", minutes);
    log::info!("weekly reports scheduled for Monday {:02}:00 UTC", WEEKLY_REPORT_HOUR);

    let refresh_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));
        // The first tick fires immediately; requests warm the cache on
        // demand, so skip it.
        interval.tick().await;
        loop {
            interval.tick().await;
            run_refresh(&refresh_state).await;
        }
    });

    tokio::spawn(async move {
        loop {
            let wait = until_next_report(Utc::now());
            let wait = wait.to_std().unwrap_or(Duration::from_secs(60));
            tokio::time::sleep(wait).await;
            run_weekly_reports(&state).await;
        }
    });
}

/// Refetches every student so the store keeps filling even when nobody
/// is looking at the dashboard.
pub async fn run_refresh(state: &AppState) {
    log::info!("[scheduler] starting stats refresh");
    state.invalidate_cache();

    let started = std::time::Instant::now();
    match stats::aggregate(&state.pool, &state.fetcher, None).await {
        Ok(records) => log::info!(
            "[scheduler] refreshed {} students in {:.1}s",
            records.len(),
            started.elapsed().as_secs_f64()
        ),
        Err(err) => log::error!("[scheduler] stats refresh failed: {}", err),
    }
}

pub async fn run_weekly_reports(state: &AppState) {
    log::info!("[scheduler] generating weekly reports");

    let generated = match reports::generate_all(&state.pool).await {
        Ok(generated) => generated,
        Err(err) => {
            log::error!("[scheduler] weekly report generation failed: {}", err);
            return;
        }
    };
    log::info!("[scheduler] generated {} reports", generated.len());

    let Some(mailer) = &state.mailer else {
        log::info!("[scheduler] email not configured, reports stored only");
        return;
    };

    for (report, buckets) in generated {
        let subject = format!(
            "Weekly LeetCode Report - {} | {} - {}",
            report.year_display(),
            report.week_start.format("%b %d"),
            report.week_end.format("%b %d, %Y"),
        );
        let html = reports::render_email_html(&report, &buckets);

        match mailer.send_report(&subject, html) {
            Ok(()) => {
                if let Err(err) = db::mark_report_emailed(&state.pool, report.id).await {
                    log::warn!("[scheduler] report {} sent but not marked: {}", report.id, err);
                }
                log::info!("[scheduler] emailed report for {}", report.year_display());
            }
            Err(err) => {
                log::error!(
                    "[scheduler] failed to email report for {}: {}",
                    report.year_display(),
                    err
                );
            }
        }
    }
}

/// Time until the next Monday 08:00:00 UTC, strictly in the future.
pub fn until_next_report(now: DateTime<Utc>) -> ChronoDuration {
    let today = now.date_naive();
    let days_until_monday = (7 - today.weekday().num_days_from_monday() as i64) % 7;
    let mut candidate = (today + ChronoDuration::days(days_until_monday))
        .and_hms_opt(WEEKLY_REPORT_HOUR, 0, 0)
        .unwrap()
        .and_utc();
    if candidate <= now {
        candidate = candidate + ChronoDuration::days(7);
    }
    candidate - now
}
