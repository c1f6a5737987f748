//! Subscriber records.

use core::fmt;

use chrono::{Days, NaiveDate};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::{ChatId, UserId};
use super::plan::Plan;

/// Days before expiry from which users are warned.
pub const EXPIRY_WARNING_DAYS: u64 = 7;

/// User-editable settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub plan: Plan,
    /// Wishlist in its stored text form (see [`crate::types::wishlist`]).
    pub wishlist: String,
    pub auto_checkout: bool,
}

/// A registered subscriber.
#[derive(Clone)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    /// Shop account password. Empty means checkout is disabled.
    pub password: SecretString,
    pub real_name: String,
    /// Last day of service.
    pub expiry_date: Option<NaiveDate>,
    pub linked_chat_id: Option<ChatId>,
    pub config: UserConfig,
}

impl User {
    /// Whether the shop password is set.
    #[must_use]
    pub fn has_password(&self) -> bool {
        !self.password.expose_secret().is_empty()
    }

    /// Whether this run may add items to the basket and check out.
    ///
    /// Requires the flag, a plan that allows it, and a password to log in with.
    #[must_use]
    pub fn auto_checkout_enabled(&self) -> bool {
        self.config.auto_checkout
            && self.config.plan.quota().auto_checkout_allowed
            && self.has_password()
    }

    /// Whether the account expires within [`EXPIRY_WARNING_DAYS`] of `today`.
    ///
    /// Already expired accounts count as expiring.
    #[must_use]
    pub fn expires_soon(&self, today: NaiveDate) -> bool {
        let Some(expiry) = self.expiry_date else {
            return false;
        };
        today
            .checked_add_days(Days::new(EXPIRY_WARNING_DAYS))
            .is_none_or(|limit| expiry <= limit)
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("real_name", &self.real_name)
            .field("expiry_date", &self.expiry_date)
            .field("linked_chat_id", &self.linked_chat_id)
            .field("config", &self.config)
            .finish()
    }
}
