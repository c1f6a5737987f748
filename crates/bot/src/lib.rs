//! Plantwatch Telegram bot library.
//!
//! Lets subscribers link their chat to their account, edit their wishlist
//! and auto-checkout setting, and pay for plan extensions.
//!
//! # Modules
//!
//! - [`conversation`] - Per-chat state machine, independent of Telegram
//! - [`payments`] - Invoices and plan extensions
//! - [`session`] - Durable chat sessions
//! - [`telegram`] - Dispatcher wiring and reply rendering

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod conversation;
pub mod error;
pub mod payments;
pub mod session;
pub mod telegram;

pub use conversation::{Conversation, Transition};
pub use error::{ConversationError, HandlerError, SessionStoreError};
pub use session::{CachedSessionStore, MemorySessionStore, PgSessionStore, SessionStore};
