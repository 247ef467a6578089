use std::path::PathBuf;

use anyhow::Context;

/// Runtime settings, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to. `HOST` / `PORT`.
    pub bind_addr: String,
    /// SQLite database URL. `STATS_DATABASE_URL`.
    pub database_url: String,
    /// Minutes between automatic stats refreshes. `STATS_REFRESH_INTERVAL`.
    pub refresh_interval_minutes: u64,
    /// Optional roster CSV imported at startup. `ROSTER_CSV`.
    pub roster_csv: Option<PathBuf>,
    pub smtp: SmtpConfig,
}

/// SMTP settings for weekly report delivery. Reports are generated and
/// stored even when mail is unconfigured; only delivery is skipped.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub hod_email: String,
    pub from_email: String,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty() && !self.hod_email.is_empty()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env_or("HOST", "127.0.0.1");
        let port: u16 = env_or("PORT", "3000")
            .parse()
            .context("PORT must be a valid port number")?;

        let refresh_interval_minutes: u64 = env_or("STATS_REFRESH_INTERVAL", "30")
            .parse()
            .context("STATS_REFRESH_INTERVAL must be a number of minutes")?;

        let username = env_or("SMTP_USERNAME", "");
        let smtp = SmtpConfig {
            server: env_or("SMTP_SERVER", "smtp.gmail.com"),
            port: env_or("SMTP_PORT", "587")
                .parse()
                .context("SMTP_PORT must be a valid port number")?,
            from_email: env_or("FROM_EMAIL", &username),
            username,
            password: env_or("SMTP_PASSWORD", ""),
            hod_email: env_or("HOD_EMAIL", ""),
        };

        Ok(Config {
            bind_addr: format!("{}:{}", host, port),
            database_url: env_or("STATS_DATABASE_URL", "sqlite://leetboard.db?mode=rwc"),
            refresh_interval_minutes,
            roster_csv: std::env::var("ROSTER_CSV").ok().map(PathBuf::from),
            smtp,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smtp_requires_credentials_and_recipient() {
        let mut smtp = SmtpConfig {
            server: "smtp.gmail.com".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            hod_email: String::new(),
            from_email: String::new(),
        };
        assert!(!smtp.is_configured());

        smtp.username = "reports@college.edu".to_string();
        smtp.password = "app-password".to_string();
        assert!(!smtp.is_configured());

        smtp.hod_email = "hod@college.edu".to_string();
        assert!(smtp.is_configured());
    }
}
