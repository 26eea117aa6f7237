//! Outbound notification port.
//!
//! Token-bearing messages (password reset links, verification links) leave
//! the system through this port. Delivery is best-effort: a failed send is
//! reported to the caller, who logs it and moves on; the token stays
//! persisted and retry is out of scope.

use async_trait::async_trait;
use log::info;
use std::sync::Mutex;
use thiserror::Error;

/// Template selector for an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    PasswordReset,
    EmailVerification,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::PasswordReset => "password_reset",
            MessageKind::EmailVerification => "email_verification",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Template context for a token-bearing message.
///
/// `action_url` embeds the plaintext secret; implementations must not log it.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub action_url: String,
    pub expiry_hours: i64,
}

/// Delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Port for delivering a token-bearing message to a user-controlled channel.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(
        &self,
        kind: MessageKind,
        recipient: &str,
        context: &MessageContext,
    ) -> Result<(), NotifyError>;
}

/// Dispatcher that records delivery in the log and nothing else.
///
/// Stands in for a real mail transport during development. Logs the
/// recipient and template, never the action URL.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(
        &self,
        kind: MessageKind,
        recipient: &str,
        context: &MessageContext,
    ) -> Result<(), NotifyError> {
        info!(
            "dispatching {} message to {} (expires in {}h)",
            kind, recipient, context.expiry_hours
        );
        Ok(())
    }
}

/// A message captured by [`RecordingDispatcher`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub kind: MessageKind,
    pub recipient: String,
    pub context: MessageContext,
}

/// Dispatcher that captures every message for later inspection in tests.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(
        &self,
        kind: MessageKind,
        recipient: &str,
        context: &MessageContext,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(SentMessage {
            kind,
            recipient: recipient.to_string(),
            context: context.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_dispatcher_captures_in_order() {
        let dispatcher = RecordingDispatcher::new();
        let context = MessageContext {
            action_url: "https://app.example.com/reset-password?token=abc".to_string(),
            expiry_hours: 24,
        };

        dispatcher
            .send(MessageKind::PasswordReset, "a@b.com", &context)
            .await
            .unwrap();
        dispatcher
            .send(MessageKind::EmailVerification, "c@d.com", &context)
            .await
            .unwrap();

        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind, MessageKind::PasswordReset);
        assert_eq!(sent[1].recipient, "c@d.com");
    }
}
