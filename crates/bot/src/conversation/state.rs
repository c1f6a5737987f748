//! Per-chat conversation state.

use serde::{Deserialize, Serialize};

use plantwatch_core::{Email, Plan};

/// Where a chat is in its conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    /// `/link` asked for the shop email address.
    AwaitingEmail,
    /// `/configure` menu is open.
    SelectingAction,
    /// Waiting for the new wishlist text.
    AwaitingWishlist,
    /// Auto-checkout menu is open.
    AwaitingAutoCheckout,
}

impl ConversationState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingEmail => "awaiting_email",
            Self::SelectingAction => "selecting_action",
            Self::AwaitingWishlist => "awaiting_wishlist",
            Self::AwaitingAutoCheckout => "awaiting_auto_checkout",
        }
    }
}

/// Durable session of one chat.
///
/// Stored as JSON keyed by chat id, so fields added later must default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub state: ConversationState,
    /// Address submitted in a link attempt that did not complete.
    #[serde(default)]
    pub pending_email: Option<String>,
    /// Account this chat is linked to.
    #[serde(default)]
    pub linked_email: Option<Email>,
    /// Tier of the last invoice sent and not yet paid.
    #[serde(default)]
    pub awaiting_payment: Option<Plan>,
}

impl Session {
    #[must_use]
    pub const fn is_linked(&self) -> bool {
        self.linked_email.is_some()
    }

    /// The same session moved to `state`.
    #[must_use]
    pub fn with_state(mut self, state: ConversationState) -> Self {
        self.state = state;
        self
    }
}
