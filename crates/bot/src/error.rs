//! Error types for the bot.

use thiserror::Error;

use plantwatch_core::StoreError;

/// Failure while handling one chat update.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store accepted the call but changed no record.
    #[error("{0} was not acknowledged by the user store")]
    NotAcknowledged(&'static str),
}

/// Failure reading or writing a chat session.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("session encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Anything that can go wrong in a Telegram update handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    #[error(transparent)]
    Session(#[from] SessionStoreError),

    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("invoice price cannot be expressed in minor units")]
    InvalidPrice,
}
