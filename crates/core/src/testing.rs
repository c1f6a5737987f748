//! In-memory fakes of the capability traits.
//!
//! Available with the `testing` feature. Each fake records the calls it
//! receives and supports failure injection so that isolation rules can be
//! exercised without a database, a shop or a mail server.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use secrecy::SecretString;

use crate::delivery::{ChatSender, DeliveryError, EmailSender};
use crate::site::{SiteClient, SiteClientFactory, SiteCredentials, SiteError};
use crate::store::{ConfigUpdate, PlanExtension, StoreError, UserStore};
use crate::types::{ChatId, Email, ItemId, Plan, User, UserConfig, UserId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for test users.
#[derive(Debug, Clone)]
pub struct UserBuilder {
    id: i32,
    email: String,
    password: String,
    real_name: String,
    expiry_date: Option<NaiveDate>,
    linked_chat_id: Option<ChatId>,
    config: UserConfig,
}

impl UserBuilder {
    #[must_use]
    pub fn new(id: i32, email: &str) -> Self {
        Self {
            id,
            email: email.to_owned(),
            password: String::new(),
            real_name: format!("User {id}"),
            expiry_date: None,
            linked_chat_id: None,
            config: UserConfig::default(),
        }
    }

    #[must_use]
    pub fn password(mut self, password: &str) -> Self {
        password.clone_into(&mut self.password);
        self
    }

    #[must_use]
    pub fn real_name(mut self, name: &str) -> Self {
        name.clone_into(&mut self.real_name);
        self
    }

    #[must_use]
    pub const fn expiry_date(mut self, date: NaiveDate) -> Self {
        self.expiry_date = Some(date);
        self
    }

    #[must_use]
    pub const fn linked_chat(mut self, chat_id: i64) -> Self {
        self.linked_chat_id = Some(ChatId::new(chat_id));
        self
    }

    #[must_use]
    pub const fn plan(mut self, plan: Plan) -> Self {
        self.config.plan = plan;
        self
    }

    #[must_use]
    pub fn wishlist(mut self, wishlist: &str) -> Self {
        wishlist.clone_into(&mut self.config.wishlist);
        self
    }

    #[must_use]
    pub const fn auto_checkout(mut self, enabled: bool) -> Self {
        self.config.auto_checkout = enabled;
        self
    }

    /// Build the user.
    ///
    /// # Panics
    ///
    /// Panics if the email is invalid.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn build(self) -> User {
        User {
            id: UserId::new(self.id),
            email: Email::parse(&self.email).expect("test email must be valid"),
            password: SecretString::from(self.password),
            real_name: self.real_name,
            expiry_date: self.expiry_date,
            linked_chat_id: self.linked_chat_id,
            config: self.config,
        }
    }
}

// =============================================================================
// UserStore
// =============================================================================

/// [`UserStore`] backed by a vector, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
    failure: Mutex<Option<StoreError>>,
    write_failure: Mutex<Option<StoreError>>,
    writes: Mutex<Vec<(UserId, String)>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: Mutex::new(users),
            ..Self::default()
        }
    }

    /// Make every call fail with `error`.
    pub fn fail_all(&self, error: StoreError) {
        *lock(&self.failure) = Some(error);
    }

    /// Make every write fail with `error`.
    pub fn fail_writes(&self, error: StoreError) {
        *lock(&self.write_failure) = Some(error);
    }

    /// Snapshot of the stored user with this id.
    #[must_use]
    pub fn user(&self, id: i32) -> Option<User> {
        lock(&self.users)
            .iter()
            .find(|user| user.id == UserId::new(id))
            .cloned()
    }

    /// Fields written so far, as `(user, field name)`.
    #[must_use]
    pub fn writes(&self) -> Vec<(UserId, String)> {
        lock(&self.writes).clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        lock(&self.failure).clone().map_or(Ok(()), Err)
    }

    fn update(
        &self,
        id: UserId,
        field: &str,
        apply: impl FnOnce(&mut User),
    ) -> Result<bool, StoreError> {
        self.check()?;
        if let Some(error) = lock(&self.write_failure).clone() {
            return Err(error);
        }
        let mut users = lock(&self.users);
        let Some(user) = users.iter_mut().find(|user| user.id == id) else {
            return Ok(false);
        };
        apply(user);
        lock(&self.writes).push((id, field.to_owned()));
        Ok(true)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.check()?;
        Ok(lock(&self.users).clone())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(lock(&self.users)
            .iter()
            .find(|user| &user.email == email)
            .cloned())
    }

    async fn set_config_field(&self, id: UserId, update: ConfigUpdate) -> Result<bool, StoreError> {
        self.update(id, update.key(), |user| match update {
            ConfigUpdate::Plan(plan) => user.config.plan = plan,
            ConfigUpdate::Wishlist(wishlist) => user.config.wishlist = wishlist,
            ConfigUpdate::AutoCheckout(enabled) => user.config.auto_checkout = enabled,
        })
    }

    async fn set_expiry_date(&self, id: UserId, date: NaiveDate) -> Result<bool, StoreError> {
        self.update(id, "expiry_date", |user| user.expiry_date = Some(date))
    }

    async fn set_linked_chat(&self, id: UserId, chat_id: Option<ChatId>) -> Result<bool, StoreError> {
        self.update(id, "linked_chat_id", |user| user.linked_chat_id = chat_id)
    }

    async fn apply_plan_extension(
        &self,
        id: UserId,
        extension: &PlanExtension,
    ) -> Result<bool, StoreError> {
        self.update(id, "plan_extension", |user| {
            user.config.plan = extension.plan;
            user.expiry_date = Some(extension.expiry_date);
            if let Some(enabled) = extension.auto_checkout {
                user.config.auto_checkout = enabled;
            }
            if let Some(wishlist) = &extension.wishlist {
                user.config.wishlist.clone_from(wishlist);
            }
        })
    }
}

// =============================================================================
// SiteClient
// =============================================================================

/// A call received by a [`FakeSite`] session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteCall {
    Open(String),
    IsAvailable(String),
    ItemName(String),
    Login,
    ClearBasket,
    AddToBasket(String, u8),
    Checkout,
    Close,
}

#[derive(Debug, Clone)]
struct FakeItem {
    name: String,
    available: bool,
}

#[derive(Debug)]
struct SiteState {
    items: HashMap<String, FakeItem>,
    item_failures: HashMap<String, SiteError>,
    name_failures: HashSet<String>,
    open_failures: HashSet<String>,
    session_failures: HashSet<String>,
    panics: HashSet<String>,
    login_failure: Option<SiteError>,
    checkout_result: Result<bool, SiteError>,
    calls: Vec<SiteCall>,
}

impl Default for SiteState {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
            item_failures: HashMap::new(),
            name_failures: HashSet::new(),
            open_failures: HashSet::new(),
            session_failures: HashSet::new(),
            panics: HashSet::new(),
            login_failure: None,
            checkout_result: Ok(true),
            calls: Vec::new(),
        }
    }
}

/// Scriptable shop shared by every session it opens.
///
/// Implements [`SiteClientFactory`]; sessions record into the shared call log.
#[derive(Debug, Clone, Default)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
}

impl FakeSite {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item to the catalogue.
    #[must_use]
    pub fn with_item(self, item_id: &str, name: &str, available: bool) -> Self {
        lock(&self.state).items.insert(
            item_id.to_owned(),
            FakeItem {
                name: name.to_owned(),
                available,
            },
        );
        self
    }

    /// Make availability lookups of this item fail.
    #[must_use]
    pub fn with_item_failure(self, item_id: &str, error: SiteError) -> Self {
        lock(&self.state)
            .item_failures
            .insert(item_id.to_owned(), error);
        self
    }

    /// Make name lookups of this item fail.
    #[must_use]
    pub fn with_name_failure(self, item_id: &str) -> Self {
        lock(&self.state).name_failures.insert(item_id.to_owned());
        self
    }

    #[must_use]
    pub fn with_login_failure(self, error: SiteError) -> Self {
        lock(&self.state).login_failure = Some(error);
        self
    }

    #[must_use]
    pub fn with_checkout_result(self, result: Result<bool, SiteError>) -> Self {
        lock(&self.state).checkout_result = result;
        self
    }

    /// Refuse to open a session for this user.
    #[must_use]
    pub fn with_open_failure(self, email: &str) -> Self {
        lock(&self.state).open_failures.insert(email.to_owned());
        self
    }

    /// Open a session for this user whose every call fails with a session error.
    #[must_use]
    pub fn with_broken_session(self, email: &str) -> Self {
        lock(&self.state).session_failures.insert(email.to_owned());
        self
    }

    /// Open a session for this user that panics on the first lookup.
    #[must_use]
    pub fn with_panicking_session(self, email: &str) -> Self {
        lock(&self.state).panics.insert(email.to_owned());
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<SiteCall> {
        lock(&self.state).calls.clone()
    }

    #[must_use]
    pub fn count(&self, call: &SiteCall) -> usize {
        lock(&self.state).calls.iter().filter(|c| *c == call).count()
    }

    /// Users a session was opened for, in order.
    #[must_use]
    pub fn opened_for(&self) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|call| match call {
                SiteCall::Open(email) => Some(email.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SiteClientFactory for FakeSite {
    async fn open(&self, credentials: &SiteCredentials) -> Result<Box<dyn SiteClient>, SiteError> {
        let email = credentials.email.as_str().to_owned();
        let mut state = lock(&self.state);
        if state.open_failures.contains(&email) {
            return Err(SiteError::Session(format!("cannot open session for {email}")));
        }
        state.calls.push(SiteCall::Open(email.clone()));
        Ok(Box::new(FakeSiteClient {
            broken: state.session_failures.contains(&email),
            panics: state.panics.contains(&email),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Session handed out by [`FakeSite`].
#[derive(Debug)]
pub struct FakeSiteClient {
    state: Arc<Mutex<SiteState>>,
    broken: bool,
    panics: bool,
}

impl FakeSiteClient {
    fn record(&self, call: SiteCall) -> Result<MutexGuard<'_, SiteState>, SiteError> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if self.broken {
            return Err(SiteError::Session("browser crashed".to_owned()));
        }
        Ok(state)
    }
}

#[async_trait]
impl SiteClient for FakeSiteClient {
    async fn is_item_available(&mut self, item_id: &ItemId) -> Result<bool, SiteError> {
        assert!(!self.panics, "site session panicked");
        let state = self.record(SiteCall::IsAvailable(item_id.to_string()))?;
        if let Some(error) = state.item_failures.get(item_id.as_str()) {
            return Err(error.clone());
        }
        state
            .items
            .get(item_id.as_str())
            .map(|item| item.available)
            .ok_or_else(|| SiteError::ItemNotFound {
                item_id: item_id.to_string(),
            })
    }

    async fn item_name(&mut self, item_id: &ItemId) -> Result<String, SiteError> {
        let state = self.record(SiteCall::ItemName(item_id.to_string()))?;
        if state.name_failures.contains(item_id.as_str()) {
            return Err(SiteError::Request("name element missing".to_owned()));
        }
        state
            .items
            .get(item_id.as_str())
            .map(|item| item.name.clone())
            .ok_or_else(|| SiteError::ItemNotFound {
                item_id: item_id.to_string(),
            })
    }

    async fn login(&mut self) -> Result<(), SiteError> {
        let state = self.record(SiteCall::Login)?;
        state.login_failure.clone().map_or(Ok(()), Err)
    }

    async fn clear_basket(&mut self) -> Result<(), SiteError> {
        self.record(SiteCall::ClearBasket).map(drop)
    }

    async fn add_to_basket(&mut self, item_id: &ItemId, quantity: u8) -> Result<(), SiteError> {
        self.record(SiteCall::AddToBasket(item_id.to_string(), quantity))
            .map(drop)
    }

    async fn checkout(&mut self) -> Result<bool, SiteError> {
        let state = self.record(SiteCall::Checkout)?;
        state.checkout_result.clone()
    }

    async fn close(&mut self) -> Result<(), SiteError> {
        lock(&self.state).calls.push(SiteCall::Close);
        Ok(())
    }
}

// =============================================================================
// Delivery
// =============================================================================

/// An email handed to [`RecordingEmailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// [`EmailSender`] that records every attempt.
#[derive(Debug, Default)]
pub struct RecordingEmailSender {
    attempts: Mutex<Vec<SentEmail>>,
    failure: Mutex<Option<DeliveryError>>,
}

impl RecordingEmailSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose every attempt fails with `error`.
    #[must_use]
    pub fn failing(error: DeliveryError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    /// Every attempted email, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> Vec<SentEmail> {
        lock(&self.attempts).clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, to: &Email, subject: &str, body: &str) -> Result<(), DeliveryError> {
        lock(&self.attempts).push(SentEmail {
            to: to.to_string(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        lock(&self.failure).clone().map_or(Ok(()), Err)
    }
}

/// [`ChatSender`] that records every attempt.
#[derive(Debug, Default)]
pub struct RecordingChatSender {
    attempts: Mutex<Vec<(ChatId, String)>>,
    blocked: Mutex<HashSet<ChatId>>,
    failure: Mutex<Option<DeliveryError>>,
}

impl RecordingChatSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a user who blocked the bot.
    pub fn block(&self, chat_id: i64) {
        lock(&self.blocked).insert(ChatId::new(chat_id));
    }

    /// Make every attempt fail with `error`.
    pub fn fail_with(&self, error: DeliveryError) {
        *lock(&self.failure) = Some(error);
    }

    /// Every attempted message, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> Vec<(ChatId, String)> {
        lock(&self.attempts).clone()
    }
}

#[async_trait]
impl ChatSender for RecordingChatSender {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), DeliveryError> {
        lock(&self.attempts).push((chat_id, text.to_owned()));
        if lock(&self.blocked).contains(&chat_id) {
            return Err(DeliveryError::Blocked);
        }
        lock(&self.failure).clone().map_or(Ok(()), Err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_applies_extension_atomically() {
        let store = MemoryUserStore::new(vec![
            UserBuilder::new(1, "a@example.com")
                .plan(Plan::Premium)
                .auto_checkout(true)
                .build(),
        ]);
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let ack = store
            .apply_plan_extension(
                UserId::new(1),
                &PlanExtension {
                    plan: Plan::Basic,
                    expiry_date: date,
                    auto_checkout: Some(false),
                    wishlist: Some("AAAAA".to_owned()),
                },
            )
            .await
            .unwrap();
        assert!(ack);

        let user = store.user(1).unwrap();
        assert_eq!(user.config.plan, Plan::Basic);
        assert!(!user.config.auto_checkout);
        assert_eq!(user.expiry_date, Some(date));
        assert_eq!(user.config.wishlist, "AAAAA");
    }

    #[tokio::test]
    async fn test_memory_store_write_to_missing_user_is_not_acknowledged() {
        let store = MemoryUserStore::default();
        let ack = store
            .set_config_field(UserId::new(9), ConfigUpdate::AutoCheckout(true))
            .await
            .unwrap();
        assert!(!ack);
    }

    #[tokio::test]
    async fn test_fake_site_records_calls() {
        let site = FakeSite::new().with_item("PIE2081", "Anthurium regale", true);
        let credentials = SiteCredentials {
            email: Email::parse("a@example.com").unwrap(),
            password: SecretString::from(String::new()),
        };
        let mut session = site.open(&credentials).await.unwrap();
        let id = ItemId::parse("PIE2081").unwrap();
        assert!(session.is_item_available(&id).await.unwrap());
        assert!(matches!(
            session
                .is_item_available(&ItemId::parse("UNKNOWN").unwrap())
                .await,
            Err(SiteError::ItemNotFound { .. })
        ));
        session.close().await.unwrap();

        assert_eq!(site.opened_for(), vec!["a@example.com".to_owned()]);
        assert_eq!(site.count(&SiteCall::Close), 1);
    }
}
