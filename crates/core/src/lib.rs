//! Plantwatch Core - Shared domain types and capability traits.
//!
//! This crate provides the types used across all Plantwatch components:
//! - `notifier` - Batch job that reconciles wishlists against the shop and notifies users
//! - `bot` - Telegram bot for linking accounts, editing settings and paying for plans
//! - `cli` - Command-line tools for migrations and user management
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. The capability traits ([`SiteClient`], [`UserStore`],
//! [`EmailSender`], [`ChatSender`]) are implemented by the service crates.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for ids and emails, plans, prices, users and wishlists
//! - [`site`] - Shop session capability
//! - [`store`] - User record persistence capability
//! - [`delivery`] - Email and chat message transports
//! - `testing` - In-memory fakes (with the `testing` feature)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod delivery;
pub mod site;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use delivery::{ChatSender, DeliveryError, EmailSender};
pub use site::{SiteClient, SiteClientFactory, SiteCredentials, SiteError};
pub use store::{ConfigUpdate, PlanExtension, StoreError, UserStore};
pub use types::*;
