//! Subscription plans and the quotas they grant.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::price::{Currency, Price};

/// Subscription tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// No paid plan; wishlist and auto-checkout are disabled.
    #[default]
    None,
    Basic,
    Premium,
}

/// Limits and feature flags derived from a [`Plan`].
///
/// Never stored; always recomputed with [`Plan::quota`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanQuota {
    /// Maximum number of wishlist lines.
    pub max_items: usize,
    /// Maximum order quantity per line.
    pub max_quantity: u8,
    pub wishlist_allowed: bool,
    pub auto_checkout_allowed: bool,
}

impl Plan {
    /// All plans, cheapest first.
    pub const ALL: [Self; 3] = [Self::None, Self::Basic, Self::Premium];

    /// Resolve the quota for this plan.
    ///
    /// ```
    /// use plantwatch_core::Plan;
    ///
    /// assert!(!Plan::None.quota().wishlist_allowed);
    /// assert_eq!(Plan::Basic.quota().max_items, 3);
    /// assert_eq!(Plan::Premium.quota().max_items, 6);
    /// assert!(Plan::Premium.quota().auto_checkout_allowed);
    /// ```
    #[must_use]
    pub const fn quota(self) -> PlanQuota {
        match self {
            Self::None => PlanQuota {
                max_items: 0,
                max_quantity: 0,
                wishlist_allowed: false,
                auto_checkout_allowed: false,
            },
            Self::Basic => PlanQuota {
                max_items: 3,
                max_quantity: 3,
                wishlist_allowed: true,
                auto_checkout_allowed: false,
            },
            Self::Premium => PlanQuota {
                max_items: 6,
                max_quantity: 3,
                wishlist_allowed: true,
                auto_checkout_allowed: true,
            },
        }
    }

    /// Database / payload representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Premium => "premium",
        }
    }

    /// Capitalized name for invoices and user-facing text.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic => "Basic",
            Self::Premium => "Premium",
        }
    }

    /// Price of a one month extension, `None` for the free tier.
    #[must_use]
    pub fn extension_price(self, currency: Currency) -> Option<Price> {
        match self {
            Self::None => None,
            Self::Basic => Some(Price::from_minor_units(1000, currency)),
            Self::Premium => Some(Price::from_minor_units(2000, currency)),
        }
    }
}

/// Shorthand for [`Plan::quota`].
#[must_use]
pub const fn quota_for(plan: Plan) -> PlanQuota {
    plan.quota()
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error returned when parsing an unknown plan name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown plan: {0}")]
pub struct UnknownPlan(pub String);

impl FromStr for Plan {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "none" | "n.a." => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            other => Err(UnknownPlan(other.to_owned())),
        }
    }
}
