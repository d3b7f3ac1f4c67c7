//! Customer email notifications. Delivery is best effort: callers persist
//! first and report the outcome of the send alongside the result.

#[cfg(test)]
mod memory;
mod smtp;
pub mod templates;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

#[cfg(test)]
pub(crate) use memory::MemoryNotifier;
pub use smtp::SmtpNotifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

/// Used when no SMTP credentials are configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, _email: &Email) -> anyhow::Result<()> {
        anyhow::bail!("email transport not configured")
    }
}

/// What happened to a notification attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOutcome {
    pub sent: bool,
    pub message: String,
}

/// Attempt delivery; never fails.
pub async fn deliver(notifier: &dyn Notifier, email: Option<Email>, what: &str) -> NotificationOutcome {
    let Some(email) = email else {
        return NotificationOutcome {
            sent: false,
            message: format!("no notification for {what}"),
        };
    };

    match notifier.send(&email).await {
        Ok(()) => {
            info!(%what, "notification sent");
            NotificationOutcome {
                sent: true,
                message: format!("{what} email sent"),
            }
        }
        Err(e) => {
            warn!(%what, error = %e, "notification failed");
            NotificationOutcome {
                sent: false,
                message: format!("{what} email not sent: {e}"),
            }
        }
    }
}
