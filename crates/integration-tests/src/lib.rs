//! Integration tests for Plantwatch.
//!
//! The scenarios run the notifier and the bot together against the
//! in-memory fakes from `plantwatch_core::testing`, so no database, shop or
//! Telegram account is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p plantwatch-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `run_loop` - Batch runs over several users
//! - `conversation` - Chat flows that change what the next run does

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use chrono::NaiveDate;

use plantwatch_bot::config::BotSettings;
use plantwatch_bot::conversation::{Conversation, Event, Reply, Session};
use plantwatch_bot::{ConversationError, MemorySessionStore, SessionStore};
use plantwatch_core::testing::{MemoryUserStore, RecordingChatSender, RecordingEmailSender};
use plantwatch_core::{ChatId, UserStore};
use plantwatch_notifier::Fanout;
use plantwatch_notifier::config::MessageSettings;

/// Build a date, panicking on an invalid one.
///
/// # Panics
///
/// Panics if the date does not exist.
#[must_use]
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_else(|| panic!("invalid date {y}-{m}-{d}"))
}

/// A fanout with both channels recording what they were asked to send.
pub struct Channels {
    pub email: Arc<RecordingEmailSender>,
    pub chat: Arc<RecordingChatSender>,
    pub fanout: Fanout,
}

impl Channels {
    #[must_use]
    pub fn new() -> Self {
        let email = Arc::new(RecordingEmailSender::new());
        let chat = Arc::new(RecordingChatSender::new());
        let fanout = Fanout::new(MessageSettings::default())
            .with_email(email.clone())
            .with_chat(chat.clone());
        Self { email, chat, fanout }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}

/// One Telegram chat driven through the conversation engine, with its
/// session persisted between messages the way the bot does it.
pub struct ChatDriver<'a> {
    users: &'a MemoryUserStore,
    sessions: MemorySessionStore,
    settings: BotSettings,
    chat_id: ChatId,
    today: NaiveDate,
}

impl<'a> ChatDriver<'a> {
    #[must_use]
    pub fn new(users: &'a MemoryUserStore, chat_id: i64, today: NaiveDate) -> Self {
        Self {
            users,
            sessions: MemorySessionStore::new(),
            settings: BotSettings::default(),
            chat_id: ChatId::new(chat_id),
            today,
        }
    }

    /// Send a text message or command.
    ///
    /// # Errors
    ///
    /// Returns `ConversationError` if the user store fails.
    pub async fn say(&self, text: &str) -> Result<Vec<Reply>, ConversationError> {
        self.send(Event::from_text(text)).await
    }

    /// Deliver any event; the session is saved only when handling succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ConversationError` if the user store fails.
    pub async fn send(&self, event: Event) -> Result<Vec<Reply>, ConversationError> {
        let session = self.session().await;
        let users: &dyn UserStore = self.users;
        let transition = Conversation::new(users, &self.settings)
            .handle(self.chat_id, &session, event, self.today)
            .await?;
        self.sessions
            .save(self.chat_id, &transition.session)
            .await
            .expect("memory store");
        Ok(transition.replies)
    }

    /// Current stored session of the chat.
    pub async fn session(&self) -> Session {
        self.sessions.load(self.chat_id).await.unwrap_or_default()
    }
}

/// Text of every reply that has one.
#[must_use]
pub fn texts(replies: &[Reply]) -> Vec<&str> {
    replies.iter().filter_map(Reply::as_text).collect()
}
