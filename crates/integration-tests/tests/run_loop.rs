//! Batch runs over several users against the in-memory fakes.

#![allow(clippy::unwrap_used)]

use plantwatch_core::testing::{FakeSite, MemoryUserStore, SiteCall, UserBuilder};
use plantwatch_core::{Email, Plan, User};
use plantwatch_integration_tests::{Channels, date};
use plantwatch_notifier::{RunLoop, RunOptions};

fn options() -> RunOptions {
    RunOptions {
        email_filter: None,
        dry_run: false,
        today: date(2024, 3, 1),
    }
}

fn premium(id: i32, email: &str, wishlist: &str) -> User {
    UserBuilder::new(id, email)
        .plan(Plan::Premium)
        .password("pw")
        .auto_checkout(true)
        .linked_chat(1000 + i64::from(id))
        .expiry_date(date(2024, 12, 31))
        .wishlist(wishlist)
        .build()
}

#[tokio::test]
async fn test_checkout_removes_only_ordered_lines() {
    let store = MemoryUserStore::new(vec![premium(
        1,
        "grower@example.com",
        "471110\nPIE2081;1\nAAAAA;2",
    )]);
    let site = FakeSite::new()
        .with_item("PIE2081", "Anthurium regale", true)
        .with_item("471110", "Anthurium luxurians", false)
        .with_item("AAAAA", "Alpha", false);
    let channels = Channels::new();

    let summary = RunLoop::new(&store, &site, &channels.fanout)
        .run_all(&options())
        .await
        .unwrap();

    assert_eq!(summary.checkouts, 1);
    assert_eq!(site.count(&SiteCall::Checkout), 1);
    assert_eq!(site.count(&SiteCall::AddToBasket("PIE2081".to_owned(), 1)), 1);
    assert_eq!(store.user(1).unwrap().config.wishlist, "471110\nAAAAA;2");

    let sent = channels.email.attempts();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("- #1: Anthurium regale (ID: PIE2081)"));
    assert!(sent[0].body.contains("checked out, but not been paid for yet:\n\n- PIE2081\n"));
}

#[tokio::test]
async fn test_nothing_available_means_no_checkout_and_no_message() {
    let store = MemoryUserStore::new(vec![premium(1, "grower@example.com", "PIE2081;1\nAAAAA;1")]);
    let site = FakeSite::new()
        .with_item("PIE2081", "Anthurium regale", false)
        .with_item("AAAAA", "Alpha", false);
    let channels = Channels::new();

    let summary = RunLoop::new(&store, &site, &channels.fanout)
        .run_all(&options())
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.notified, 0);
    assert_eq!(site.count(&SiteCall::Checkout), 0);
    assert!(channels.email.attempts().is_empty());
    assert!(channels.chat.attempts().is_empty());
    assert_eq!(store.user(1).unwrap().config.wishlist, "PIE2081;1\nAAAAA;1");
}

#[tokio::test]
async fn test_blocked_chat_still_gets_email() {
    let store = MemoryUserStore::new(vec![premium(1, "grower@example.com", "PIE2081")]);
    let site = FakeSite::new().with_item("PIE2081", "Anthurium regale", true);
    let channels = Channels::new();
    channels.chat.block(1001);

    let summary = RunLoop::new(&store, &site, &channels.fanout)
        .run_all(&options())
        .await
        .unwrap();

    assert_eq!(summary.notified, 1);
    assert_eq!(channels.chat.attempts().len(), 1);
    assert_eq!(channels.email.attempts().len(), 1);
    assert_eq!(channels.email.attempts()[0].to.as_str(), "grower@example.com");
}

#[tokio::test]
async fn test_failing_users_do_not_stop_the_batch() {
    let store = MemoryUserStore::new(vec![
        premium(1, "broken@example.com", "PIE2081"),
        premium(2, "panics@example.com", "PIE2081"),
        premium(3, "cannot-open@example.com", "PIE2081"),
        premium(4, "fine@example.com", "PIE2081"),
    ]);
    let site = FakeSite::new()
        .with_item("PIE2081", "Anthurium regale", true)
        .with_broken_session("broken@example.com")
        .with_panicking_session("panics@example.com")
        .with_open_failure("cannot-open@example.com");
    let channels = Channels::new();

    let summary = RunLoop::new(&store, &site, &channels.fanout)
        .run_all(&options())
        .await
        .unwrap();

    assert_eq!(summary.selected, 4);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.processed, 1);
    // Every opened session was closed again, including the panicking one.
    assert_eq!(site.opened_for().len(), 3);
    assert_eq!(site.count(&SiteCall::Close), 3);
    assert_eq!(channels.email.attempts().len(), 1);
}

#[tokio::test]
async fn test_email_filter_runs_one_user() {
    let store = MemoryUserStore::new(vec![
        premium(1, "grower@example.com", "PIE2081"),
        premium(2, "other@example.com", "PIE2081"),
    ]);
    let site = FakeSite::new().with_item("PIE2081", "Anthurium regale", true);
    let channels = Channels::new();

    let summary = RunLoop::new(&store, &site, &channels.fanout)
        .run_all(&RunOptions {
            email_filter: Some(Email::parse("Other@Example.com").unwrap()),
            ..options()
        })
        .await
        .unwrap();

    assert_eq!(summary.selected, 1);
    assert_eq!(site.opened_for(), vec!["other@example.com".to_owned()]);
}

#[tokio::test]
async fn test_expiring_user_is_warned() {
    let user = UserBuilder::new(1, "basic@example.com")
        .plan(Plan::Basic)
        .expiry_date(date(2024, 3, 5))
        .wishlist("PIE2081")
        .build();
    let store = MemoryUserStore::new(vec![user]);
    let site = FakeSite::new().with_item("PIE2081", "Anthurium regale", true);
    let channels = Channels::new();

    RunLoop::new(&store, &site, &channels.fanout)
        .run_all(&options())
        .await
        .unwrap();

    let body = &channels.email.attempts()[0].body;
    assert!(body.contains("expiring within the next 7 days (on 2024-03-05)"));
    assert!(!body.contains("checked out"));
}
