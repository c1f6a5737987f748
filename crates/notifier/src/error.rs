//! Error types for the notifier.
//!
//! Failures are absorbed at the smallest enclosing scope: items inside the
//! reconciler, channels inside the fanout, users inside the run loop. Only a
//! [`RunError`] ends a run.

use thiserror::Error;

use plantwatch_core::{SiteError, StoreError};

/// Failure while processing one user. Logged, then the loop moves on.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("site session failed: {0}")]
    Site(#[from] SiteError),

    #[error("user store failed: {0}")]
    Store(#[from] StoreError),

    #[error("user processing panicked: {0}")]
    Panic(String),
}

impl UserError {
    /// Short class name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Site(SiteError::ItemNotFound { .. }) => "lookup_failure",
            Self::Site(_) => "site_failure",
            Self::Store(_) => "store_failure",
            Self::Panic(_) => "panic",
        }
    }
}

/// Failure that ends the run with a non-zero exit code.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot load users: {0}")]
    LoadUsers(#[source] StoreError),

    #[error("user store became unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let lookup = UserError::Site(SiteError::ItemNotFound {
            item_id: "PIE2081".to_owned(),
        });
        assert_eq!(lookup.kind(), "lookup_failure");
        assert_eq!(UserError::Site(SiteError::Timeout).kind(), "site_failure");
        assert_eq!(UserError::Panic("boom".to_owned()).kind(), "panic");
        assert_eq!(
            UserError::Store(StoreError::Backend("constraint".to_owned())).kind(),
            "store_failure"
        );
    }
}
