//! Core types for Plantwatch.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod plan;
pub mod price;
pub mod user;
pub mod wishlist;

pub use email::{Email, EmailError};
pub use id::*;
pub use plan::{Plan, PlanQuota, UnknownPlan, quota_for};
pub use price::{Currency, Price, UnknownCurrency};
pub use user::{User, UserConfig};
pub use wishlist::{ItemId, WishlistEntry, WishlistError};
