//! Subscriber management commands.
//!
//! # Usage
//!
//! ```bash
//! # Show all users, soonest expiry first
//! pw-cli users list
//!
//! # Only users with a linked Telegram chat
//! pw-cli users list --linked
//!
//! # Create a user record
//! pw-cli users create -e grower@example.com -n "Ada Grower" --password secret
//! ```

use std::cmp::Ordering;

use secrecy::SecretString;

use plantwatch_core::{Email, User};
use plantwatch_notifier::db::{NewUser, RepositoryError, UserRepository};

use super::{CommandError, connect};

/// Print a table of users.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a row is corrupt.
pub async fn list(linked_only: bool) -> Result<(), CommandError> {
    let pool = connect().await?;
    let users = UserRepository::new(&pool).list().await?;

    let users = select(users, linked_only);
    tracing::info!(count = users.len(), linked_only, "Listing users");

    #[allow(clippy::print_stdout)]
    {
        println!(
            "{:<32} {:<8} {:<10} {:<14} {}",
            "EMAIL", "PLAN", "EXPIRY", "CHAT", "AUTO-CHECKOUT"
        );
        for user in &users {
            println!("{}", format_row(user));
        }
    }
    Ok(())
}

/// Filter and order users for display: soonest expiry first, users without
/// an expiry date last.
fn select(mut users: Vec<User>, linked_only: bool) -> Vec<User> {
    if linked_only {
        users.retain(|user| user.linked_chat_id.is_some());
    }
    users.sort_by(|a, b| match (a.expiry_date, b.expiry_date) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    users
}

fn format_row(user: &User) -> String {
    let expiry = user
        .expiry_date
        .map_or_else(|| "-".to_owned(), |date| date.format("%Y-%m-%d").to_string());
    let chat = user
        .linked_chat_id
        .map_or_else(|| "-".to_owned(), |chat| chat.to_string());
    format!(
        "{:<32} {:<8} {:<10} {:<14} {}",
        user.email, user.config.plan, expiry, chat, user.config.auto_checkout
    )
}

/// Create a user record.
///
/// # Returns
///
/// The ID of the created user.
///
/// # Errors
///
/// Returns `CommandError` if the email is invalid, already registered, or
/// the database fails.
pub async fn create(email: &str, name: &str, password: Option<&str>) -> Result<i32, CommandError> {
    let email = Email::parse(email).map_err(|_| CommandError::InvalidEmail(email.to_owned()))?;
    let pool = connect().await?;

    tracing::info!("Creating user: {} ({})", email, name);

    let new_user = NewUser {
        email: email.clone(),
        real_name: name.to_owned(),
        password: SecretString::from(password.unwrap_or_default().to_owned()),
        expiry_date: None,
    };
    let user = match UserRepository::new(&pool).create(&new_user).await {
        Ok(user) => user,
        Err(RepositoryError::Conflict(_)) => return Err(CommandError::UserExists(email.to_string())),
        Err(e) => return Err(e.into()),
    };

    tracing::info!("User created successfully! ID: {}, Email: {}", user.id, user.email);
    if password.is_none() {
        tracing::warn!("Note: User has no shop password, auto-checkout will stay disabled.");
    }

    Ok(user.id.get())
}
