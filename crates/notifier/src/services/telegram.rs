//! Telegram delivery via the Bot API.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::{ApiError, RequestError};

use plantwatch_core::{ChatSender, DeliveryError};

use crate::config::TelegramConfig;

/// Sends plain text messages to linked chats.
#[derive(Clone)]
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    #[must_use]
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(config.bot_token.expose_secret()),
        }
    }
}

/// Map a Bot API failure to a delivery outcome.
#[must_use]
pub fn classify(err: &RequestError) -> DeliveryError {
    match err {
        RequestError::Api(ApiError::BotBlocked | ApiError::BotKicked) => DeliveryError::Blocked,
        RequestError::Api(ApiError::UserDeactivated | ApiError::ChatNotFound) => {
            DeliveryError::InvalidRecipient(err.to_string())
        }
        other => DeliveryError::Transport(other.to_string()),
    }
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send(
        &self,
        chat_id: plantwatch_core::ChatId,
        text: &str,
    ) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(chat_id.get()), text)
            .await
            .map(drop)
            .map_err(|e| classify(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_bot_is_classified() {
        assert_eq!(
            classify(&RequestError::Api(ApiError::BotBlocked)),
            DeliveryError::Blocked
        );
        assert!(matches!(
            classify(&RequestError::Api(ApiError::ChatNotFound)),
            DeliveryError::InvalidRecipient(_)
        ));
        assert!(matches!(
            classify(&RequestError::Api(ApiError::MessageTextIsEmpty)),
            DeliveryError::Transport(_)
        ));
    }
}
