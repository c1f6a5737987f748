//! Notification rendering and delivery.
//!
//! One message is rendered per user and run, then handed to every enabled
//! channel. Channels fail independently: an SMTP outage never stops the
//! Telegram message and a user who blocked the bot still gets the email.

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::instrument;

use plantwatch_core::{ChatSender, DeliveryError, EmailSender, User};

use crate::config::MessageSettings;
use crate::reconcile::RunResult;

/// Render the notification for `user`, or `None` if nothing is available.
#[must_use]
pub fn render_message(
    user: &User,
    result: &RunResult,
    today: NaiveDate,
    settings: &MessageSettings,
) -> Option<String> {
    if !result.has_available_items() {
        return None;
    }

    let shop = &settings.shop_name;
    let mut message = format!("The following items are now available in {shop}:\n\n");
    for (index, (item_id, name)) in result.available_items.iter().enumerate() {
        message.push_str(&format!("- #{}: {name} (ID: {item_id})\n", index + 1));
    }

    if result.checkout_attempted {
        if result.checked_out() {
            message.push_str(
                "\nThe following items have been checked out, but not been paid for yet:\n\n",
            );
            for (item_id, _) in &result.available_items {
                if result.ordered_item_ids.contains(item_id) {
                    message.push_str(&format!("- {item_id}\n"));
                }
            }
            message.push_str(&format!(
                "\nPlease proceed to pay by sending an email to the {shop} team.\
                 \n\nHint: You should have received an email with the invoice from {shop}."
            ));
        } else {
            message.push_str("\nTried to checkout but it failed.");
        }
    }

    if let Some(expiry) = user.expiry_date.filter(|_| user.expires_soon(today)) {
        message.push_str(&format!(
            "\n\nImportant: Your account is expiring within the next 7 days (on {}). \
             Please extend via Telegram bot ({}) by typing '/extendbasic' or '/extendpremium'.",
            expiry.format("%Y-%m-%d"),
            settings.bot_url
        ));
    }

    Some(message)
}

/// Subject and body of the operator report for a failed run.
#[must_use]
pub fn render_failure_report(error: &str) -> (String, String) {
    (
        "Plantwatch notifier failed".to_owned(),
        format!("Error while running the notifier!\n\n----------\n\n{error}\n\n----------"),
    )
}

/// Why a channel was not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NothingToSend,
    ChannelDisabled,
    NotLinked,
    /// The user blocked the bot.
    Blocked,
}

/// What happened on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered,
    Skipped(SkipReason),
    Failed(DeliveryError),
}

impl ChannelOutcome {
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Per-channel result of one [`Fanout::notify`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub email: ChannelOutcome,
    pub telegram: ChannelOutcome,
}

impl FanoutReport {
    const fn skipped(reason: SkipReason) -> Self {
        Self {
            email: ChannelOutcome::Skipped(reason),
            telegram: ChannelOutcome::Skipped(reason),
        }
    }

    /// Whether at least one channel delivered the message.
    #[must_use]
    pub const fn delivered_any(&self) -> bool {
        self.email.is_delivered() || self.telegram.is_delivered()
    }
}

/// Delivers notifications over the configured channels.
pub struct Fanout {
    email: Option<Arc<dyn EmailSender>>,
    chat: Option<Arc<dyn ChatSender>>,
    settings: MessageSettings,
}

impl Fanout {
    /// A fanout with no channels enabled.
    #[must_use]
    pub const fn new(settings: MessageSettings) -> Self {
        Self {
            email: None,
            chat: None,
            settings,
        }
    }

    #[must_use]
    pub fn with_email(mut self, sender: Arc<dyn EmailSender>) -> Self {
        self.email = Some(sender);
        self
    }

    #[must_use]
    pub fn with_chat(mut self, sender: Arc<dyn ChatSender>) -> Self {
        self.chat = Some(sender);
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &MessageSettings {
        &self.settings
    }

    /// Render and deliver the notification for one user.
    ///
    /// Never fails: every channel error is logged and reported in the
    /// returned [`FanoutReport`].
    #[instrument(skip(self, result, today), fields(user = %user.email))]
    pub async fn notify(&self, user: &User, result: &RunResult, today: NaiveDate) -> FanoutReport {
        let Some(message) = render_message(user, result, today, &self.settings) else {
            return FanoutReport::skipped(SkipReason::NothingToSend);
        };

        let email = self.send_email(user, &message).await;
        let telegram = self.send_chat(user, &message).await;
        tracing::info!(?email, ?telegram, "Notification sent");

        FanoutReport { email, telegram }
    }

    async fn send_email(&self, user: &User, message: &str) -> ChannelOutcome {
        let Some(sender) = &self.email else {
            return ChannelOutcome::Skipped(SkipReason::ChannelDisabled);
        };
        match sender
            .send(&user.email, &self.settings.email_subject, message)
            .await
        {
            Ok(()) => ChannelOutcome::Delivered,
            Err(e) => {
                tracing::error!(error = %e, "Email delivery failed");
                ChannelOutcome::Failed(e)
            }
        }
    }

    async fn send_chat(&self, user: &User, message: &str) -> ChannelOutcome {
        let Some(sender) = &self.chat else {
            return ChannelOutcome::Skipped(SkipReason::ChannelDisabled);
        };
        let Some(chat_id) = user.linked_chat_id else {
            return ChannelOutcome::Skipped(SkipReason::NotLinked);
        };
        match sender.send(chat_id, message).await {
            Ok(()) => ChannelOutcome::Delivered,
            Err(DeliveryError::Blocked) => {
                tracing::info!(%chat_id, "User blocked the bot, skipping Telegram");
                ChannelOutcome::Skipped(SkipReason::Blocked)
            }
            Err(e) => {
                tracing::error!(%chat_id, error = %e, "Telegram delivery failed");
                ChannelOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use plantwatch_core::testing::{RecordingChatSender, RecordingEmailSender, UserBuilder};
    use plantwatch_core::{ChatId, ItemId, Plan};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn id(s: &str) -> ItemId {
        ItemId::parse(s).unwrap()
    }

    fn available(items: &[(&str, &str)]) -> RunResult {
        RunResult {
            available_items: items
                .iter()
                .map(|(item, name)| (id(item), (*name).to_owned()))
                .collect(),
            ..RunResult::default()
        }
    }

    fn user() -> User {
        UserBuilder::new(1, "grower@example.com")
            .plan(Plan::Premium)
            .linked_chat(42)
            .expiry_date(date(2024, 12, 31))
            .build()
    }

    #[test]
    fn test_render_lists_items_in_discovery_order() {
        let result = available(&[("PIE2081", "Anthurium regale"), ("AAAAA", "Alpha")]);
        let message =
            render_message(&user(), &result, date(2024, 1, 1), &MessageSettings::default())
                .unwrap();

        assert_eq!(
            message,
            "The following items are now available in ecuagenera.com:\n\n\
             - #1: Anthurium regale (ID: PIE2081)\n\
             - #2: Alpha (ID: AAAAA)\n"
        );
    }

    #[test]
    fn test_render_nothing_when_nothing_available() {
        let message = render_message(
            &user(),
            &RunResult::default(),
            date(2024, 1, 1),
            &MessageSettings::default(),
        );
        assert_eq!(message, None);
    }

    #[test]
    fn test_render_checkout_paragraphs() {
        let mut result = available(&[("PIE2081", "Anthurium regale"), ("AAAAA", "Alpha")]);
        result.ordered_item_ids = BTreeSet::from([id("PIE2081")]);
        result.checkout_attempted = true;
        result.checkout_succeeded = Some(true);

        let settings = MessageSettings::default();
        let message = render_message(&user(), &result, date(2024, 1, 1), &settings).unwrap();
        assert!(message.contains("checked out, but not been paid for yet:\n\n- PIE2081\n"));
        assert!(!message.contains("- AAAAA\n"));
        assert!(message.contains("invoice from ecuagenera.com."));

        result.checkout_succeeded = Some(false);
        let message = render_message(&user(), &result, date(2024, 1, 1), &settings).unwrap();
        assert!(message.ends_with("\nTried to checkout but it failed."));
    }

    #[test]
    fn test_render_expiry_warning() {
        let result = available(&[("PIE2081", "Anthurium regale")]);
        let settings = MessageSettings::default();

        let message = render_message(&user(), &result, date(2024, 12, 26), &settings).unwrap();
        assert!(message.contains("expiring within the next 7 days (on 2024-12-31)"));
        assert!(message.contains("https://telegram.me/ecuagenera_bot"));

        let message = render_message(&user(), &result, date(2024, 12, 1), &settings).unwrap();
        assert!(!message.contains("Important"));
    }

    #[tokio::test]
    async fn test_blocked_chat_does_not_stop_email() {
        let email = Arc::new(RecordingEmailSender::new());
        let chat = Arc::new(RecordingChatSender::new());
        chat.block(42);
        let fanout = Fanout::new(MessageSettings::default())
            .with_email(email.clone())
            .with_chat(chat.clone());

        let report = fanout
            .notify(&user(), &available(&[("PIE2081", "Anthurium regale")]), date(2024, 1, 1))
            .await;

        assert_eq!(report.telegram, ChannelOutcome::Skipped(SkipReason::Blocked));
        assert_eq!(report.email, ChannelOutcome::Delivered);
        assert_eq!(email.attempts().len(), 1);
        assert_eq!(email.attempts()[0].subject, "Plant availability update");
    }

    #[tokio::test]
    async fn test_email_failure_does_not_stop_telegram() {
        let email = Arc::new(RecordingEmailSender::failing(DeliveryError::Transport(
            "connection refused".to_owned(),
        )));
        let chat = Arc::new(RecordingChatSender::new());
        let fanout = Fanout::new(MessageSettings::default())
            .with_email(email.clone())
            .with_chat(chat.clone());

        let report = fanout
            .notify(&user(), &available(&[("PIE2081", "Anthurium regale")]), date(2024, 1, 1))
            .await;

        assert!(matches!(report.email, ChannelOutcome::Failed(_)));
        assert_eq!(report.telegram, ChannelOutcome::Delivered);
        assert!(report.delivered_any());
        assert_eq!(chat.attempts()[0].0, ChatId::new(42));
    }

    #[tokio::test]
    async fn test_unlinked_user_gets_email_only() {
        let chat = Arc::new(RecordingChatSender::new());
        let fanout = Fanout::new(MessageSettings::default()).with_chat(chat.clone());
        let unlinked = UserBuilder::new(2, "other@example.com").build();

        let report = fanout
            .notify(&unlinked, &available(&[("PIE2081", "Anthurium regale")]), date(2024, 1, 1))
            .await;

        assert_eq!(report.email, ChannelOutcome::Skipped(SkipReason::ChannelDisabled));
        assert_eq!(report.telegram, ChannelOutcome::Skipped(SkipReason::NotLinked));
        assert!(chat.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_nothing_available_sends_nothing() {
        let email = Arc::new(RecordingEmailSender::new());
        let fanout = Fanout::new(MessageSettings::default()).with_email(email.clone());

        let report = fanout
            .notify(&user(), &RunResult::default(), date(2024, 1, 1))
            .await;

        assert_eq!(report.email, ChannelOutcome::Skipped(SkipReason::NothingToSend));
        assert!(email.attempts().is_empty());
    }
}
