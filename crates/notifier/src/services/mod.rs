//! Delivery channels.

pub mod email;
pub mod telegram;

pub use email::{EmailError, EmailService};
pub use telegram::TelegramSender;
