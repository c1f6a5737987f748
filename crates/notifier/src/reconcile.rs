//! Availability reconciliation.
//!
//! Walks a user's wishlist against one open [`SiteClient`] session and
//! computes what is available, what was put in the basket and whether the
//! checkout went through.
//!
//! Lookup failures are isolated per item. Only a broken session
//! ([`SiteError::is_fatal`]) aborts the walk.

use std::collections::BTreeSet;

use tracing::instrument;

use plantwatch_core::{ItemId, SiteClient, SiteError, WishlistEntry};

/// Display name used when the site cannot tell us the item name.
pub const INVALID_ITEM_NAME: &str = "invalid item ID";

/// Outcome of reconciling one user's wishlist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Available items with their display names, in discovery order.
    pub available_items: Vec<(ItemId, String)>,
    pub ordered_item_ids: BTreeSet<ItemId>,
    pub checkout_attempted: bool,
    /// `None` unless a checkout was attempted.
    pub checkout_succeeded: Option<bool>,
}

impl RunResult {
    /// Whether there is anything to tell the user.
    #[must_use]
    pub fn has_available_items(&self) -> bool {
        !self.available_items.is_empty()
    }

    #[must_use]
    pub fn checked_out(&self) -> bool {
        self.checkout_succeeded == Some(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Basket {
    /// Not logged in yet.
    Pending,
    Ready,
    /// Preparation failed; this run is notify-only.
    Unusable,
}

/// Reconcile `entries` against the site.
///
/// Items that cannot be looked up are treated as unavailable. When
/// `auto_checkout` is set, available entries with a quantity are added to
/// the basket (after a one-time login and basket clear) and a single
/// checkout is attempted at the end.
///
/// # Errors
///
/// Returns the [`SiteError`] of the first call that broke the session.
#[instrument(skip(entries, site), fields(entries = entries.len()))]
pub async fn reconcile(
    entries: &[WishlistEntry],
    site: &mut dyn SiteClient,
    auto_checkout: bool,
) -> Result<RunResult, SiteError> {
    let mut result = RunResult::default();
    let mut basket = if auto_checkout {
        Basket::Pending
    } else {
        Basket::Unusable
    };

    for entry in entries {
        let item_id = &entry.item_id;

        match site.is_item_available(item_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(item = %item_id, "Item not available");
                continue;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e @ SiteError::ItemNotFound { .. }) => {
                tracing::warn!(item = %item_id, error = %e, "Item lookup failed, treating as unavailable");
                continue;
            }
            Err(e) => {
                tracing::warn!(item = %item_id, error = %e, "Availability check failed, skipping item");
                continue;
            }
        }

        let name = match site.item_name(item_id).await {
            Ok(name) => name,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(item = %item_id, error = %e, "Item name lookup failed");
                INVALID_ITEM_NAME.to_owned()
            }
        };
        tracing::info!(item = %item_id, %name, "Item available");
        result.available_items.push((item_id.clone(), name));

        let Some(quantity) = entry.quantity else {
            continue;
        };
        if basket == Basket::Pending {
            basket = prepare_basket(site).await?;
        }
        if basket != Basket::Ready {
            continue;
        }

        match site.add_to_basket(item_id, quantity).await {
            Ok(()) => {
                tracing::info!(item = %item_id, quantity, "Added to basket");
                result.ordered_item_ids.insert(item_id.clone());
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(item = %item_id, error = %e, "Adding to basket failed");
            }
        }
    }

    if result.available_items.is_empty() {
        return Ok(result);
    }

    if auto_checkout && !result.ordered_item_ids.is_empty() {
        result.checkout_attempted = true;
        let succeeded = match site.checkout().await {
            Ok(succeeded) => succeeded,
            Err(e) => {
                tracing::error!(error = %e, "Checkout failed");
                false
            }
        };
        tracing::info!(
            items = result.ordered_item_ids.len(),
            succeeded,
            "Checkout attempted"
        );
        result.checkout_succeeded = Some(succeeded);
    }

    Ok(result)
}

async fn prepare_basket(site: &mut dyn SiteClient) -> Result<Basket, SiteError> {
    let prepared = match site.login().await {
        Ok(()) => site.clear_basket().await,
        Err(e) => Err(e),
    };
    match prepared {
        Ok(()) => Ok(Basket::Ready),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot prepare basket, continuing without auto-checkout");
            Ok(Basket::Unusable)
        }
    }
}
