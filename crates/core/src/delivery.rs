//! Message transports used for notifications.

use async_trait::async_trait;

use crate::types::{ChatId, Email};

/// Delivery failure on one channel.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The recipient blocked the bot.
    #[error("recipient blocked the sender")]
    Blocked,
    /// The transport failed (connection, authentication, API error).
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &Email, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError>;
}
