//! Outbound notifications
//!
//! Delivery is best effort. [`NotificationDispatcher`] never fails the
//! caller: a transport error or timeout is logged and handed back as a
//! [`Warning`] for the response, and whatever was committed before the
//! send stays committed.

use async_trait::async_trait;
use aws_sdk_sesv2::Client as SesClient;
use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use shared::error::{ErrorCode, Warning};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a single send
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Upstream rejected message: {0}")]
    Upstream(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Message transport
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), NotifyError>;

    async fn send_ticket_id(&self, to: &str, ticket_id: &str) -> Result<(), NotifyError>;
}

/// Amazon SES transport
pub struct SesNotifier {
    ses: SesClient,
    from: String,
}

impl SesNotifier {
    pub fn new(ses: SesClient, from: impl Into<String>) -> Self {
        Self {
            ses,
            from: from.into(),
        }
    }

    async fn send_text(&self, to: &str, subject: &str, text: String) -> Result<(), NotifyError> {
        let subject = Content::builder()
            .data(subject)
            .build()
            .map_err(|e| NotifyError::Build(e.to_string()))?;
        let body = Body::builder()
            .text(
                Content::builder()
                    .data(text)
                    .build()
                    .map_err(|e| NotifyError::Build(e.to_string()))?,
            )
            .build();
        let message = Message::builder().subject(subject).body(body).build();

        self.ses
            .send_email()
            .from_email_address(&self.from)
            .destination(Destination::builder().to_addresses(to).build())
            .content(EmailContent::builder().simple(message).build())
            .send()
            .await
            .map_err(|e| NotifyError::Upstream(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SesNotifier {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), NotifyError> {
        let text = format!(
            "Your Spot & Sort verification code is: {code}\n\
             It is valid for 10 minutes. If you did not report an issue, ignore this email."
        );
        self.send_text(to, "Your verification code", text).await?;
        tracing::info!(to = to, "Verification code sent");
        Ok(())
    }

    async fn send_ticket_id(&self, to: &str, ticket_id: &str) -> Result<(), NotifyError> {
        let text = format!(
            "Thank you for your report.\n\
             Your ticket id is {ticket_id}. Use it to track the issue and to confirm \
             the fix once the authority marks it resolved."
        );
        self.send_text(to, &format!("Issue reported: {ticket_id}"), text)
            .await?;
        tracing::info!(to = to, ticket_id = ticket_id, "Ticket id sent");
        Ok(())
    }
}

/// Development transport: writes messages to the log instead of sending
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), NotifyError> {
        tracing::info!(to = to, code = code, "[dev] verification code");
        Ok(())
    }

    async fn send_ticket_id(&self, to: &str, ticket_id: &str) -> Result<(), NotifyError> {
        tracing::info!(to = to, ticket_id = ticket_id, "[dev] ticket id");
        Ok(())
    }
}

/// Sends through a [`Notifier`] and converts failures into warnings
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn verification_code(&self, to: &str, code: &str) -> Option<Warning> {
        let result = bounded(self.notifier.send_verification_code(to, code)).await;
        to_warning(result, "verification code", to)
    }

    pub async fn ticket_id(&self, to: &str, ticket_id: &str) -> Option<Warning> {
        let result = bounded(self.notifier.send_ticket_id(to, ticket_id)).await;
        to_warning(result, "ticket id", to)
    }
}

async fn bounded<F>(send: F) -> Result<(), NotifyError>
where
    F: std::future::Future<Output = Result<(), NotifyError>>,
{
    tokio::time::timeout(SEND_TIMEOUT, send)
        .await
        .unwrap_or(Err(NotifyError::Timeout(SEND_TIMEOUT)))
}

fn to_warning(result: Result<(), NotifyError>, what: &str, to: &str) -> Option<Warning> {
    match result {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(to = to, error = %e, "Failed to send {what}");
            Some(Warning::new(
                ErrorCode::NotificationFailed,
                format!("Could not send the {what} email"),
            ))
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Notifier doubles for unit tests

    use super::*;
    use std::sync::Mutex;

    /// Records every message; optionally fails every send
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub codes: Mutex<Vec<(String, String)>>,
        pub tickets: Mutex<Vec<(String, String)>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn last_code_for(&self, to: &str) -> Option<String> {
            self.codes
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(addr, _)| addr == to)
                .map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), NotifyError> {
            self.codes.lock().unwrap().push((to.into(), code.into()));
            if self.fail {
                return Err(NotifyError::Upstream("relay down".into()));
            }
            Ok(())
        }

        async fn send_ticket_id(&self, to: &str, ticket_id: &str) -> Result<(), NotifyError> {
            self.tickets.lock().unwrap().push((to.into(), ticket_id.into()));
            if self.fail {
                return Err(NotifyError::Upstream("relay down".into()));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingNotifier;
    use super::*;

    #[tokio::test]
    async fn test_success_has_no_warning() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = NotificationDispatcher::new(notifier.clone());

        assert!(dispatcher.verification_code("a@x.com", "123456").await.is_none());
        assert_eq!(notifier.last_code_for("a@x.com").as_deref(), Some("123456"));
    }

    #[tokio::test]
    async fn test_failure_becomes_warning() {
        let dispatcher = NotificationDispatcher::new(Arc::new(RecordingNotifier::failing()));
        let warning = dispatcher.ticket_id("a@x.com", "P-1").await.unwrap();
        assert_eq!(warning.code, ErrorCode::NotificationFailed);
    }

    struct StuckNotifier;

    #[async_trait]
    impl Notifier for StuckNotifier {
        async fn send_verification_code(&self, _: &str, _: &str) -> Result<(), NotifyError> {
            std::future::pending().await
        }

        async fn send_ticket_id(&self, _: &str, _: &str) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_transport_times_out() {
        let dispatcher = NotificationDispatcher::new(Arc::new(StuckNotifier));
        let warning = dispatcher.verification_code("a@x.com", "1").await;
        assert!(warning.is_some());
    }
}
