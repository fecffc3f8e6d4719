//! Outbound transactional email.
//!
//! Drivers: SMTP (lettre), log (tracing only) and array (kept in memory so
//! callers can inspect what would have been sent).

mod smtp;
pub mod templates;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{MailConfig, MailDriver};

pub use smtp::SmtpMailer;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to render template: {0}")]
    Render(String),
}

/// A rendered plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to.join(", "),
            subject = %email.subject,
            "mail (log driver)\n{}",
            email.body
        );
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Default)]
pub struct ArrayMailer {
    sent: Mutex<Vec<Email>>,
}

impl ArrayMailer {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Mailer for ArrayMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError::SendFailed("mailbox lock poisoned".into()))?
            .push(email.clone());
        Ok(())
    }
}

pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match config.driver {
        MailDriver::Smtp => Ok(Arc::new(SmtpMailer::new(config)?)),
        MailDriver::Log => Ok(Arc::new(LogMailer)),
        MailDriver::Array => Ok(Arc::new(ArrayMailer::default())),
    }
}

/// Sends a message; failures are logged and swallowed so jobs and requests keep going.
pub async fn deliver(mailer: &dyn Mailer, email: Result<Email, MailError>) -> bool {
    let email = match email {
        Ok(email) if email.to.is_empty() => {
            tracing::debug!("skipping email without recipients");
            return false;
        }
        Ok(email) => email,
        Err(err) => {
            tracing::warn!(error = %err, "could not build email");
            return false;
        }
    };
    match mailer.send(&email).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, subject = %email.subject, "email delivery failed");
            false
        }
    }
}
