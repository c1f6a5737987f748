//! Plantwatch notifier library.
//!
//! The batch job that checks every subscriber's wishlist against the shop,
//! optionally checks out, and notifies them by email and Telegram.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod fanout;
pub mod reconcile;
pub mod run_loop;
pub mod services;
pub mod site;

pub use error::{RunError, UserError};
pub use fanout::{ChannelOutcome, Fanout, FanoutReport};
pub use reconcile::{RunResult, reconcile};
pub use run_loop::{RunLoop, RunOptions, RunSummary};
