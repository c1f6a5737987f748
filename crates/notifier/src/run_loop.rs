//! The batch loop over all users.
//!
//! Users are processed one at a time in random order, each with their own
//! site session. A failing user is logged and counted; only an unreachable
//! user store stops the run.

use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;
use futures::FutureExt;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::instrument;

use plantwatch_core::types::wishlist;
use plantwatch_core::{
    ConfigUpdate, Email, SiteClientFactory, SiteCredentials, StoreError, User, UserStore,
    WishlistEntry,
};

use crate::error::{RunError, UserError};
use crate::fanout::{Fanout, render_message};
use crate::reconcile::{RunResult, reconcile};

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Only process the first user with this email.
    pub email_filter: Option<Email>,
    /// Reconcile and render, but neither deliver nor persist.
    pub dry_run: bool,
    /// Current UTC date.
    pub today: NaiveDate,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub selected: usize,
    /// Users with an empty or unusable wishlist.
    pub skipped: usize,
    pub processed: usize,
    /// Users who were told about at least one available item.
    pub notified: usize,
    pub failed: usize,
    /// Successful checkouts.
    pub checkouts: usize,
}

#[derive(Debug)]
enum UserOutcome {
    Skipped,
    Processed { notified: bool, checked_out: bool },
}

/// Narrow `users` to the first one matching `filter`, if any.
///
/// Storage order decides which user wins when an email appears twice.
#[must_use]
pub fn select_users(users: Vec<User>, filter: Option<&Email>) -> Vec<User> {
    let Some(email) = filter else {
        return users;
    };
    let mut selected = Vec::new();
    for user in users {
        if &user.email == email {
            selected.push(user);
            break;
        }
    }
    selected
}

/// Runs reconciliation and notification for every user.
pub struct RunLoop<'a> {
    store: &'a dyn UserStore,
    sites: &'a dyn SiteClientFactory,
    fanout: &'a Fanout,
    /// Shuffles the users; advances on every run.
    rng: Mutex<StdRng>,
}

impl<'a> RunLoop<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn UserStore,
        sites: &'a dyn SiteClientFactory,
        fanout: &'a Fanout,
    ) -> Self {
        Self {
            store,
            sites,
            fanout,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Use `rng` for the processing order instead of an OS-seeded one.
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    fn shuffle(&self, users: &mut [User]) {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        users.shuffle(&mut *rng);
    }

    /// Process every selected user once.
    ///
    /// # Errors
    ///
    /// Returns `RunError` if users cannot be loaded or the store becomes
    /// unavailable mid-run. Every other failure is absorbed per user.
    #[instrument(skip(self, options), fields(dry_run = options.dry_run))]
    pub async fn run_all(&self, options: &RunOptions) -> Result<RunSummary, RunError> {
        let users = self
            .store
            .list_users()
            .await
            .map_err(RunError::LoadUsers)?;
        let total = users.len();

        let mut users = select_users(users, options.email_filter.as_ref());
        if let (Some(email), true) = (&options.email_filter, users.is_empty()) {
            tracing::warn!(%email, "No user with this email");
        }
        self.shuffle(&mut users);

        let mut summary = RunSummary {
            selected: users.len(),
            ..RunSummary::default()
        };
        tracing::info!(total, selected = summary.selected, "Starting run");

        for user in &users {
            let outcome = AssertUnwindSafe(self.run_user(user, options))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(UserError::Panic(panic_message(&*panic))));

            match outcome {
                Ok(UserOutcome::Skipped) => summary.skipped += 1,
                Ok(UserOutcome::Processed {
                    notified,
                    checked_out,
                }) => {
                    summary.processed += 1;
                    summary.notified += usize::from(notified);
                    summary.checkouts += usize::from(checked_out);
                }
                Err(UserError::Store(e @ StoreError::Unavailable(_))) => {
                    tracing::error!(user = %user.email, error = %e, "User store unavailable, aborting run");
                    return Err(RunError::StoreUnavailable(e));
                }
                Err(e) => {
                    tracing::error!(
                        user = %user.email,
                        kind = e.kind(),
                        error = %e,
                        "Processing user failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(?summary, "Run finished");
        Ok(summary)
    }

    #[instrument(skip_all, fields(user = %user.email))]
    async fn run_user(&self, user: &User, options: &RunOptions) -> Result<UserOutcome, UserError> {
        let quota = user.config.plan.quota();
        let entries = match wishlist::parse(&user.config.wishlist, &quota) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(plan = %user.config.plan, error = %e, "Stored wishlist is invalid, skipping user");
                return Ok(UserOutcome::Skipped);
            }
        };
        if entries.is_empty() {
            tracing::debug!("Empty wishlist, skipping user");
            return Ok(UserOutcome::Skipped);
        }

        // A dry run never places orders.
        let auto_checkout = user.auto_checkout_enabled() && !options.dry_run;
        if user.config.auto_checkout && !user.has_password() {
            tracing::warn!("Auto-checkout requested but no shop password stored");
        }

        let result = self.reconcile_in_session(user, &entries, auto_checkout).await?;

        if options.dry_run {
            if let Some(message) =
                render_message(user, &result, options.today, self.fanout.settings())
            {
                tracing::info!(%message, "Dry run, not sending");
            }
            return Ok(UserOutcome::Processed {
                notified: false,
                checked_out: false,
            });
        }

        let report = self.fanout.notify(user, &result, options.today).await;

        let checked_out = result.checked_out();
        if checked_out {
            self.remove_ordered_items(user, &result).await?;
        }

        Ok(UserOutcome::Processed {
            notified: report.delivered_any(),
            checked_out,
        })
    }

    /// Open a site session, reconcile, and close the session whatever happened.
    async fn reconcile_in_session(
        &self,
        user: &User,
        entries: &[WishlistEntry],
        auto_checkout: bool,
    ) -> Result<RunResult, UserError> {
        let credentials = SiteCredentials {
            email: user.email.clone(),
            password: user.password.clone(),
        };
        let mut session = self.sites.open(&credentials).await?;

        let result = AssertUnwindSafe(reconcile(entries, session.as_mut(), auto_checkout))
            .catch_unwind()
            .await;

        if let Err(e) = session.close().await {
            tracing::warn!(error = %e, "Closing site session failed");
        }

        match result {
            Ok(result) => Ok(result?),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn remove_ordered_items(&self, user: &User, result: &RunResult) -> Result<(), UserError> {
        let trimmed = wishlist::remove_items(&user.config.wishlist, &result.ordered_item_ids);
        let acknowledged = self
            .store
            .set_config_field(user.id, ConfigUpdate::Wishlist(trimmed))
            .await?;
        if acknowledged {
            tracing::info!(
                items = result.ordered_item_ids.len(),
                "Removed checked out items from wishlist"
            );
        } else {
            tracing::warn!("Wishlist update was not acknowledged");
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use plantwatch_core::testing::{
        FakeSite, MemoryUserStore, RecordingChatSender, RecordingEmailSender, SiteCall,
        UserBuilder,
    };
    use plantwatch_core::Plan;

    use super::*;
    use crate::config::MessageSettings;

    fn options() -> RunOptions {
        RunOptions {
            email_filter: None,
            dry_run: false,
            today: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        }
    }

    fn premium(id: i32, email: &str, wishlist: &str) -> User {
        UserBuilder::new(id, email)
            .plan(Plan::Premium)
            .password("pw")
            .auto_checkout(true)
            .wishlist(wishlist)
            .build()
    }

    #[test]
    fn test_select_users_first_match_wins() {
        let users = vec![
            UserBuilder::new(1, "a@example.com").build(),
            UserBuilder::new(2, "b@example.com").build(),
            UserBuilder::new(3, "b@example.com").build(),
        ];
        let email = Email::parse("B@example.com").unwrap();

        let selected = select_users(users.clone(), Some(&email));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.get(), 2);

        assert_eq!(select_users(users, None).len(), 3);
    }

    async fn processing_order(seed: u64) -> Vec<String> {
        let store = MemoryUserStore::new(
            (1..=8)
                .map(|id| premium(id, &format!("user{id}@example.com"), "AAAAA"))
                .collect(),
        );
        let site = FakeSite::new().with_item("AAAAA", "Alpha", false);
        let fanout = Fanout::new(MessageSettings::default());

        let summary = RunLoop::new(&store, &site, &fanout)
            .with_rng(StdRng::seed_from_u64(seed))
            .run_all(&options())
            .await
            .unwrap();
        assert_eq!(summary.processed, 8);
        site.opened_for()
    }

    #[tokio::test]
    async fn test_users_are_processed_in_shuffled_order() {
        let storage_order: Vec<String> = (1..=8).map(|id| format!("user{id}@example.com")).collect();

        let mut orders = Vec::new();
        for seed in 0..4 {
            let order = processing_order(seed).await;
            let mut sorted = order.clone();
            sorted.sort();
            assert_eq!(sorted, storage_order);
            orders.push(order);
        }

        assert_eq!(processing_order(2).await, orders[2]);
        assert!(orders.iter().any(|order| *order != storage_order));
        assert!(orders.windows(2).any(|pair| pair[0] != pair[1]));
    }

    #[tokio::test]
    async fn test_each_run_draws_a_new_order() {
        let store = MemoryUserStore::new(
            (1..=8)
                .map(|id| premium(id, &format!("user{id}@example.com"), "AAAAA"))
                .collect(),
        );
        let site = FakeSite::new().with_item("AAAAA", "Alpha", false);
        let fanout = Fanout::new(MessageSettings::default());
        let run_loop = RunLoop::new(&store, &site, &fanout).with_rng(StdRng::seed_from_u64(11));

        run_loop.run_all(&options()).await.unwrap();
        run_loop.run_all(&options()).await.unwrap();

        let opened = site.opened_for();
        assert_eq!(opened.len(), 16);
        assert_ne!(opened[..8], opened[8..]);
    }

    #[tokio::test]
    async fn test_checkout_trims_wishlist() {
        let store = MemoryUserStore::new(vec![premium(
            1,
            "grower@example.com",
            "AAAAA\nPIE2081;1\nBBBBB;2",
        )]);
        let site = FakeSite::new()
            .with_item("PIE2081", "Anthurium regale", true)
            .with_item("AAAAA", "Alpha", false)
            .with_item("BBBBB", "Beta", false);
        let email = Arc::new(RecordingEmailSender::new());
        let fanout = Fanout::new(MessageSettings::default()).with_email(email.clone());

        let summary = RunLoop::new(&store, &site, &fanout)
            .run_all(&options())
            .await
            .unwrap();

        assert_eq!(summary.checkouts, 1);
        assert_eq!(summary.notified, 1);
        assert_eq!(store.user(1).unwrap().config.wishlist, "AAAAA\nBBBBB;2");
        assert_eq!(site.count(&SiteCall::Close), 1);
    }

    #[tokio::test]
    async fn test_empty_wishlist_opens_no_session() {
        let store = MemoryUserStore::new(vec![
            UserBuilder::new(1, "a@example.com").plan(Plan::Basic).build(),
            UserBuilder::new(2, "b@example.com")
                .plan(Plan::Basic)
                .wishlist("na")
                .build(),
        ]);
        let site = FakeSite::new();
        let fanout = Fanout::new(MessageSettings::default());

        let summary = RunLoop::new(&store, &site, &fanout)
            .run_all(&options())
            .await
            .unwrap();

        assert_eq!(summary.skipped, 2);
        assert!(site.opened_for().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_wishlist_is_skipped() {
        let store = MemoryUserStore::new(vec![
            UserBuilder::new(1, "a@example.com")
                .plan(Plan::None)
                .wishlist("PIE2081")
                .build(),
        ]);
        let site = FakeSite::new();
        let fanout = Fanout::new(MessageSettings::default());

        let summary = RunLoop::new(&store, &site, &fanout)
            .run_all(&options())
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 0);
        assert!(site.opened_for().is_empty());
    }

    #[tokio::test]
    async fn test_broken_user_does_not_stop_others() {
        let store = MemoryUserStore::new(vec![
            premium(1, "broken@example.com", "PIE2081"),
            premium(2, "panics@example.com", "PIE2081"),
            premium(3, "fine@example.com", "PIE2081"),
        ]);
        let site = FakeSite::new()
            .with_item("PIE2081", "Anthurium regale", true)
            .with_broken_session("broken@example.com")
            .with_panicking_session("panics@example.com");
        let chat = Arc::new(RecordingChatSender::new());
        let email = Arc::new(RecordingEmailSender::new());
        let fanout = Fanout::new(MessageSettings::default())
            .with_email(email.clone())
            .with_chat(chat);

        let summary = RunLoop::new(&store, &site, &fanout)
            .run_all(&options())
            .await
            .unwrap();

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.processed, 1);
        assert_eq!(email.attempts().len(), 1);
        assert_eq!(email.attempts()[0].to, "fine@example.com");
        assert_eq!(site.count(&SiteCall::Close), 3);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_run() {
        let store = MemoryUserStore::default();
        store.fail_all(StoreError::Unavailable("connection refused".to_owned()));
        let site = FakeSite::new();
        let fanout = Fanout::new(MessageSettings::default());

        let result = RunLoop::new(&store, &site, &fanout).run_all(&options()).await;
        assert!(matches!(result, Err(RunError::LoadUsers(_))));
    }

    #[tokio::test]
    async fn test_store_outage_during_trim_stops_run() {
        let store = MemoryUserStore::new(vec![premium(1, "grower@example.com", "PIE2081;1")]);
        store.fail_writes(StoreError::Unavailable("connection reset".to_owned()));
        let site = FakeSite::new().with_item("PIE2081", "Anthurium regale", true);
        let fanout = Fanout::new(MessageSettings::default());

        let result = RunLoop::new(&store, &site, &fanout).run_all(&options()).await;
        assert!(matches!(result, Err(RunError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_dry_run_neither_sends_nor_persists() {
        let store = MemoryUserStore::new(vec![premium(1, "grower@example.com", "PIE2081;1")]);
        let site = FakeSite::new().with_item("PIE2081", "Anthurium regale", true);
        let email = Arc::new(RecordingEmailSender::new());
        let fanout = Fanout::new(MessageSettings::default()).with_email(email.clone());

        let summary = RunLoop::new(&store, &site, &fanout)
            .run_all(&RunOptions {
                dry_run: true,
                ..options()
            })
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert!(email.attempts().is_empty());
        assert!(store.writes().is_empty());
        assert_eq!(site.count(&SiteCall::Checkout), 0);
    }

    #[tokio::test]
    async fn test_email_filter_processes_single_user() {
        let store = MemoryUserStore::new(vec![
            premium(1, "a@example.com", "PIE2081"),
            premium(2, "b@example.com", "PIE2081"),
        ]);
        let site = FakeSite::new().with_item("PIE2081", "Anthurium regale", false);
        let fanout = Fanout::new(MessageSettings::default());

        let summary = RunLoop::new(&store, &site, &fanout)
            .run_all(&RunOptions {
                email_filter: Some(Email::parse("b@example.com").unwrap()),
                ..options()
            })
            .await
            .unwrap();

        assert_eq!(summary.selected, 1);
        assert_eq!(site.opened_for(), vec!["b@example.com".to_owned()]);
    }
}
