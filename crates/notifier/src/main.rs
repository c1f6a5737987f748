//! Plantwatch notifier - one pass over all subscribers.
//!
//! Meant to be started by an external scheduler. Exits with status 0 when
//! the run completes, even if individual users failed, and with status 1
//! when the user store is unreachable.
//!
//! # Usage
//!
//! ```bash
//! plantwatch-notifier                      # all users
//! plantwatch-notifier --email a@example.com
//! plantwatch-notifier --dry-run            # render only
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plantwatch_core::{Email, EmailSender};
use plantwatch_notifier::config::NotifierConfig;
use plantwatch_notifier::db::{self, PgUserStore};
use plantwatch_notifier::fanout::{Fanout, render_failure_report};
use plantwatch_notifier::services::{EmailService, TelegramSender};
use plantwatch_notifier::site::HttpSiteFactory;
use plantwatch_notifier::{RunLoop, RunOptions, RunSummary};

#[derive(Parser)]
#[command(name = "plantwatch-notifier")]
#[command(about = "Check wishlists against the shop and notify subscribers")]
#[command(version)]
struct Cli {
    /// Only process the user with this email
    #[arg(short, long)]
    email: Option<Email>,

    /// Reconcile and render messages without sending or saving anything
    #[arg(long)]
    dry_run: bool,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &NotifierConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(config: &NotifierConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "plantwatch_notifier=info".into());

    let json_layer = config
        .json_logs
        .then(|| tracing_subscriber::fmt::layer().json());
    let text_layer = (!config.json_logs).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

async fn run(
    cli: &Cli,
    config: &NotifierConfig,
    email: Option<Arc<EmailService>>,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let pool = db::create_pool(&config.database_url).await?;
    let store = PgUserStore::new(pool);
    let sites = HttpSiteFactory::new(config.site.clone())?;

    let mut fanout = Fanout::new(config.messages.clone());
    if let Some(email) = email {
        fanout = fanout.with_email(email);
    } else {
        tracing::warn!("SMTP not configured, email notifications disabled");
    }
    if let Some(telegram) = &config.telegram {
        fanout = fanout.with_chat(Arc::new(TelegramSender::new(telegram)));
    } else {
        tracing::warn!("TELEGRAM_BOT_TOKEN not set, Telegram notifications disabled");
    }

    let options = RunOptions {
        email_filter: cli.email.clone(),
        dry_run: cli.dry_run,
        today: Utc::now().date_naive(),
    };

    let summary = RunLoop::new(&store, &sites, &fanout)
        .run_all(&options)
        .await?;
    Ok(summary)
}

async fn report_failure(email: Option<&EmailService>, to: Option<&Email>, error: &str) {
    let (Some(email), Some(to)) = (email, to) else {
        return;
    };
    let (subject, body) = render_failure_report(error);
    if let Err(e) = email.send(to, &subject, &body).await {
        tracing::error!(error = %e, "Failed to send failure report");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = NotifierConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let sentry_guard = init_sentry(&config);
    init_tracing(&config);

    let email = match config.email.as_ref().map(EmailService::new).transpose() {
        Ok(email) => email.map(Arc::new),
        Err(e) => {
            tracing::error!(error = %e, "Invalid SMTP configuration, email disabled");
            None
        }
    };

    match run(&cli, &config, email.clone()).await {
        Ok(summary) => {
            tracing::info!(
                processed = summary.processed,
                notified = summary.notified,
                failed = summary.failed,
                "Notifier finished"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Notifier run failed");
            report_failure(email.as_deref(), config.alert_email.as_ref(), &e.to_string()).await;
            // Flush pending Sentry events before exiting.
            drop(sentry_guard);
            std::process::exit(1);
        }
    }
}
