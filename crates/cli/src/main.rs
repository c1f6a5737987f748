//! Plantwatch CLI - Database migrations and user management.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! pw-cli migrate
//!
//! # List users (optionally only those with a linked chat)
//! pw-cli users list --linked
//!
//! # Create a user
//! pw-cli users create -e grower@example.com -n "Ada Grower" --password secret
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `users list` - Show users sorted by expiry date
//! - `users create` - Create a user record

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pw-cli")]
#[command(author, version, about = "Plantwatch operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// List users, soonest expiry first
    List {
        /// Only users with a linked Telegram chat
        #[arg(long)]
        linked: bool,
    },
    /// Create a new user
    Create {
        /// Email address (also the shop login)
        #[arg(short, long)]
        email: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Shop password, needed for auto-checkout
        #[arg(long)]
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Users { action } => match action {
            UserAction::List { linked } => commands::users::list(linked).await?,
            UserAction::Create {
                email,
                name,
                password,
            } => {
                commands::users::create(&email, &name, password.as_deref()).await?;
            }
        },
    }
    Ok(())
}
