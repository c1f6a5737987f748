//! User record persistence capability.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{ChatId, Email, Plan, User, UserId};

/// Errors raised by a [`UserStore`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached. Fatal to the current run.
    #[error("user store unavailable: {0}")]
    Unavailable(String),
    /// The store rejected or failed the operation.
    #[error("user store error: {0}")]
    Backend(String),
    /// A stored value could not be decoded.
    #[error("data corruption: {0}")]
    DataCorruption(String),
    #[error("user not found")]
    NotFound,
}

/// A single user-editable field update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdate {
    Plan(Plan),
    /// Wishlist in stored text form.
    Wishlist(String),
    AutoCheckout(bool),
}

impl ConfigUpdate {
    /// Name of the stored field.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Plan(_) => "plan",
            Self::Wishlist(_) => "wishlist",
            Self::AutoCheckout(_) => "auto_checkout",
        }
    }
}

/// Changes applied after a successful plan payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanExtension {
    pub plan: Plan,
    pub expiry_date: NaiveDate,
    /// New auto-checkout flag, `None` keeps the current value.
    pub auto_checkout: Option<bool>,
    /// Wishlist cut down to the plan's quota, `None` keeps the current value.
    pub wishlist: Option<String>,
}

/// Storage of [`User`] records.
///
/// Every write is atomic per call. The `bool` returned by writes is the
/// store's acknowledgement that a record was updated.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users, in storage order.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError>;

    async fn set_config_field(&self, id: UserId, update: ConfigUpdate) -> Result<bool, StoreError>;

    async fn set_expiry_date(&self, id: UserId, date: NaiveDate) -> Result<bool, StoreError>;

    async fn set_linked_chat(&self, id: UserId, chat_id: Option<ChatId>) -> Result<bool, StoreError>;

    /// Write plan, expiry date, and the optional auto-checkout flag and
    /// wishlist in one update.
    async fn apply_plan_extension(
        &self,
        id: UserId,
        extension: &PlanExtension,
    ) -> Result<bool, StoreError>;
}
