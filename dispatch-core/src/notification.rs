use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single device-targeted push message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushReceipt {
    pub provider: String,
    pub message_id: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PushError {
    #[error("push provider not configured: {0}")]
    NotConfigured(String),
    #[error("push provider authentication failed: {0}")]
    Authentication(String),
    #[error("device token is no longer registered")]
    Unregistered,
    #[error("push provider rejected message (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("push transport failed: {0}")]
    Transport(String),
}

impl PushError {
    /// Whether a later attempt can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PushError::Transport(_) | PushError::Authentication(_) => true,
            PushError::Rejected { status, .. } => *status == 429 || *status >= 500,
            PushError::NotConfigured(_) | PushError::Unregistered => false,
        }
    }
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message to one device
    async fn send(&self, message: &PushMessage) -> Result<PushReceipt, PushError>;
}

/// Provider used when no push credentials are configured: logs the message and
/// reports success.
pub struct LogPushProvider;

#[async_trait]
impl PushProvider for LogPushProvider {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, message: &PushMessage) -> Result<PushReceipt, PushError> {
        tracing::info!(
            token = %dispatch_shared::Masked(message.token.as_str()),
            title = %message.title,
            "Push delivery skipped (log provider): {}",
            message.body
        );
        Ok(PushReceipt {
            provider: self.name().to_string(),
            message_id: format!("log-{}", uuid::Uuid::new_v4().simple()),
        })
    }
}
