//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! pw-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `NOTIFIER_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection string
//!
//! # Migration Files
//!
//! Migrations live in `crates/notifier/migrations/` and are embedded at
//! compile time:
//! ```text
//! migrations/
//! ├── 20240301000001_create_users.sql
//! └── 20240301000002_create_chat_sessions.sql
//! ```

use plantwatch_notifier::db::MIGRATOR;

use super::{CommandError, connect};

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!("Running migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
