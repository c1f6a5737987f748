//! Shop session capability.
//!
//! The notifier talks to the shop through a [`SiteClient`], one session per
//! user. Sessions are opened by a [`SiteClientFactory`] and must be closed
//! with [`SiteClient::close`] on every exit path.

use core::fmt;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::types::{Email, ItemId};

/// Errors raised by a shop session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    /// The item id does not resolve to a product page.
    #[error("item {item_id} not found on site")]
    ItemNotFound {
        /// The item id that was looked up.
        item_id: String,
    },
    /// The request failed (network error, unexpected status, parse error).
    #[error("site request failed: {0}")]
    Request(String),
    /// The request did not complete in time.
    #[error("site request timed out")]
    Timeout,
    /// The session cannot perform this operation.
    #[error("operation not supported by this site client: {0}")]
    Unsupported(&'static str),
    /// The session itself is broken and cannot be used further.
    #[error("site session failed: {0}")]
    Session(String),
}

impl SiteError {
    /// Whether the error invalidates the whole session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

/// Account used to log in to the shop.
#[derive(Clone)]
pub struct SiteCredentials {
    pub email: Email,
    pub password: SecretString,
}

impl fmt::Debug for SiteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteCredentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// One session on the shop website.
#[async_trait]
pub trait SiteClient: Send {
    /// Whether the item can currently be ordered.
    async fn is_item_available(&mut self, item_id: &ItemId) -> Result<bool, SiteError>;

    /// Display name of the item.
    async fn item_name(&mut self, item_id: &ItemId) -> Result<String, SiteError>;

    async fn login(&mut self) -> Result<(), SiteError>;

    async fn clear_basket(&mut self) -> Result<(), SiteError>;

    async fn add_to_basket(&mut self, item_id: &ItemId, quantity: u8) -> Result<(), SiteError>;

    /// Submit the basket. `Ok(false)` means the shop refused the order.
    async fn checkout(&mut self) -> Result<bool, SiteError>;

    /// Release the session. The client must not be used afterwards.
    async fn close(&mut self) -> Result<(), SiteError>;
}

/// Opens [`SiteClient`] sessions.
#[async_trait]
pub trait SiteClientFactory: Send + Sync {
    async fn open(&self, credentials: &SiteCredentials) -> Result<Box<dyn SiteClient>, SiteError>;
}
