use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::SmtpConfig;
use crate::error::{AppError, Result};

/// Delivers weekly report emails to the HoD over SMTP.
pub struct Mailer {
    smtp: SmtpTransport,
    from: String,
    to: String,
}

impl Mailer {
    /// Builds a mailer from config, or `None` when mail is not
    /// configured (reports are still generated and stored).
    pub fn from_config(config: &SmtpConfig) -> Result<Option<Self>> {
        if !config.is_configured() {
            return Ok(None);
        }

        let creds = Credentials::new(config.username.clone(), config.password.clone());
        let smtp = SmtpTransport::starttls_relay(&config.server)
            .map_err(|err| AppError::Mail(err.to_string()))?
            .credentials(creds)
            .port(config.port)
            .build();

        Ok(Some(Mailer {
            smtp,
            from: config.from_email.clone(),
            to: config.hod_email.clone(),
        }))
    }

    pub fn send_report(&self, subject: &str, html_body: String) -> Result<()> {
        let email = Message::builder()
            .from(
                format!("LeetBoard <{}>", self.from)
                    .parse()
                    .map_err(|err| AppError::Mail(format!("bad from address: {}", err)))?,
            )
            .to(self
                .to
                .parse()
                .map_err(|err| AppError::Mail(format!("bad recipient address: {}", err)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body)
            .map_err(|err| AppError::Mail(err.to_string()))?;

        self.smtp
            .send(&email)
            .map_err(|err| AppError::Mail(err.to_string()))?;
        Ok(())
    }
}
