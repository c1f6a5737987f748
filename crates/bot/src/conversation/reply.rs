//! Outputs of the conversation state machine.

use crate::payments::Invoice;

use super::event::CallbackAction;

/// An inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: CallbackAction,
}

impl Button {
    #[must_use]
    pub fn new(label: &str, action: CallbackAction) -> Self {
        Self {
            label: label.to_owned(),
            action,
        }
    }
}

/// Something to send back to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Text with an inline keyboard, one inner vector per row.
    Menu { text: String, rows: Vec<Vec<Button>> },
    Invoice(Invoice),
    /// Answer to a pending pre-checkout query.
    PreCheckout { ok: bool, error_message: Option<String> },
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// The text shown to the user, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Menu { text, .. } => Some(text),
            Self::Invoice(_) | Self::PreCheckout { .. } => None,
        }
    }
}
