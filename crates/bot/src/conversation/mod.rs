//! Chat conversation state machine.
//!
//! [`Conversation::handle`] takes the stored [`Session`] of a chat and one
//! [`Event`], looks up the matching rule in [`rules::RULES`] and runs its
//! handler. The result is the new session plus the replies to send; nothing
//! is sent or saved here, so the engine runs the same against Telegram and
//! against in-memory fakes.

pub mod event;
pub mod reply;
pub mod rules;
pub mod state;
pub mod texts;

use chrono::NaiveDate;
use tracing::instrument;

use plantwatch_core::types::wishlist;
use plantwatch_core::{ChatId, ConfigUpdate, Email, Plan, User, UserStore, WishlistError};

use crate::config::BotSettings;
use crate::error::ConversationError;
use crate::payments::{self, InvoicePayload};

pub use event::{CallbackAction, Command, Event, EventKind};
pub use reply::{Button, Reply};
pub use rules::{Handler, Next, Rule};
pub use state::{ConversationState, Session};

/// Session after an event, and what to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub session: Session,
    pub replies: Vec<Reply>,
}

/// What a handler produced.
struct Step {
    replies: Vec<Reply>,
    /// Overrides the rule's next state.
    next: Option<ConversationState>,
}

impl Step {
    fn reply(text: impl Into<String>) -> Self {
        Self::replies(vec![Reply::text(text)])
    }

    const fn replies(replies: Vec<Reply>) -> Self {
        Self {
            replies,
            next: None,
        }
    }

    fn then(mut self, state: ConversationState) -> Self {
        self.next = Some(state);
        self
    }
}

/// Resolved account of the chat.
enum Account {
    NotLinked,
    /// Linked to an address the store no longer knows.
    Missing,
    Found(Box<User>),
}

/// The conversation engine for one bot.
#[derive(Clone, Copy)]
pub struct Conversation<'a> {
    users: &'a dyn UserStore,
    settings: &'a BotSettings,
}

impl<'a> Conversation<'a> {
    #[must_use]
    pub const fn new(users: &'a dyn UserStore, settings: &'a BotSettings) -> Self {
        Self { users, settings }
    }

    /// Apply one event to a chat session.
    ///
    /// Events without a rule in the current state leave the session
    /// untouched and produce no reply.
    ///
    /// # Errors
    ///
    /// Returns `ConversationError` if the user store fails. The caller must
    /// then discard the transition and keep the previous session.
    #[instrument(skip(self, session, event), fields(state = session.state.as_str(), event = ?event.kind()))]
    pub async fn handle(
        &self,
        chat_id: ChatId,
        session: &Session,
        event: Event,
        today: NaiveDate,
    ) -> Result<Transition, ConversationError> {
        let Some(rule) = rules::lookup(session.state, event.kind()) else {
            tracing::debug!("No rule for event, ignoring");
            return Ok(Transition {
                session: session.clone(),
                replies: Vec::new(),
            });
        };

        let mut next = session.clone();
        let step = self.run(rule.handler, chat_id, &mut next, event, today).await?;
        next.state = step.next.unwrap_or(match rule.next {
            Next::Stay => session.state,
            Next::To(state) => state,
        });

        tracing::debug!(handler = ?rule.handler, next = next.state.as_str(), "Transition");
        Ok(Transition {
            session: next,
            replies: step.replies,
        })
    }

    async fn run(
        &self,
        handler: Handler,
        chat_id: ChatId,
        session: &mut Session,
        event: Event,
        today: NaiveDate,
    ) -> Result<Step, ConversationError> {
        match (handler, event) {
            (Handler::Greet, _) => Ok(Step::reply(texts::start(self.settings))),
            (Handler::Help, _) => Ok(Step::reply(texts::help(self.settings))),
            (Handler::Support, _) => Ok(Step::reply(texts::support(self.settings))),
            (Handler::Unknown, _) => Ok(Step::reply(texts::UNKNOWN)),
            (Handler::Bye, _) => Ok(Step::reply(texts::BYE)),
            (Handler::Cancel, _) => {
                session.pending_email = None;
                Ok(Step::reply(texts::CANCEL))
            }
            (Handler::StartLink, _) => Ok(self.start_link(session)),
            (Handler::SubmitEmail, Event::Text(text)) => self.submit_email(chat_id, session, &text).await,
            (Handler::Unlink, _) => self.unlink(chat_id, session).await,
            (Handler::StartConfigure, _) => Ok(start_configure(session)),
            (Handler::OpenWishlistEditor, _) => self.open_wishlist_editor(session).await,
            (Handler::SubmitWishlist, Event::Text(text)) => self.submit_wishlist(session, &text).await,
            (Handler::OpenAutoCheckoutMenu, _) => self.open_auto_checkout_menu(session).await,
            (Handler::SetAutoCheckout, Event::Callback(action)) => {
                self.set_auto_checkout(session, action == CallbackAction::AutoCheckoutOn)
                    .await
            }
            (Handler::UserInfo, _) => self.user_info(session).await,
            (Handler::SendInvoice, Event::Command(command)) => Ok(self.send_invoice(session, command)),
            (Handler::PreCheckout, Event::PreCheckout { payload }) => Ok(pre_checkout(session, &payload)),
            (Handler::ConfirmPayment, Event::PaymentSucceeded { payload }) => {
                Ok(self.confirm_payment(session, &payload, today).await)
            }
            (handler, event) => {
                tracing::warn!(?handler, ?event, "Handler received an event it cannot use");
                Ok(Step::reply(texts::UNKNOWN))
            }
        }
    }

    async fn account(&self, session: &Session) -> Result<Account, ConversationError> {
        let Some(email) = &session.linked_email else {
            return Ok(Account::NotLinked);
        };
        Ok(match self.users.find_by_email(email).await? {
            Some(user) => Account::Found(Box::new(user)),
            None => {
                tracing::warn!(user = %email, "Linked account no longer exists");
                Account::Missing
            }
        })
    }

    // =========================================================================
    // Linking
    // =========================================================================

    fn start_link(&self, session: &Session) -> Step {
        if let Some(email) = &session.linked_email {
            return Step::reply(texts::already_linked(email.as_str())).then(ConversationState::Idle);
        }
        if let Some(previous) = &session.pending_email {
            tracing::debug!(previous = %previous, "Retrying link");
        }
        Step::reply(texts::link_prompt(self.settings))
    }

    async fn submit_email(
        &self,
        chat_id: ChatId,
        session: &mut Session,
        text: &str,
    ) -> Result<Step, ConversationError> {
        let text = text.trim();
        if !text.contains('@') {
            return Ok(Step::reply(texts::email_missing_at(self.settings))
                .then(ConversationState::AwaitingEmail));
        }

        let user = match text.parse::<Email>() {
            Ok(email) => self.users.find_by_email(&email).await?,
            Err(_) => None,
        };
        let Some(user) = user else {
            tracing::info!(%chat_id, email = text, "Link attempt for unknown address");
            session.pending_email = Some(text.to_owned());
            return Ok(Step::reply(texts::not_registered(self.settings)));
        };

        if !self.users.set_linked_chat(user.id, Some(chat_id)).await? {
            return Err(ConversationError::NotAcknowledged("linking the chat"));
        }
        tracing::info!(%chat_id, user = %user.email, "Chat linked");
        session.linked_email = Some(user.email);
        session.pending_email = None;
        Ok(Step::reply(texts::linked(&user.real_name)))
    }

    async fn unlink(&self, chat_id: ChatId, session: &mut Session) -> Result<Step, ConversationError> {
        let Some(email) = session.linked_email.take() else {
            return Ok(Step::reply(texts::UNLINK_NOT_LINKED));
        };

        if let Some(user) = self.users.find_by_email(&email).await?
            && user.linked_chat_id == Some(chat_id)
            && !self.users.set_linked_chat(user.id, None).await?
        {
            return Err(ConversationError::NotAcknowledged("unlinking the chat"));
        }
        tracing::info!(%chat_id, user = %email, "Chat unlinked");
        Ok(Step::reply(texts::unlinked(email.as_str())))
    }

    async fn user_info(&self, session: &Session) -> Result<Step, ConversationError> {
        Ok(match self.account(session).await? {
            Account::NotLinked => Step::reply(texts::NOT_LINKED),
            Account::Missing => Step::reply(texts::LINKED_USER_MISSING),
            Account::Found(user) => Step::reply(texts::user_info(&user)),
        })
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The linked account, or the step that refuses to go on without one.
    async fn configurable(&self, session: &Session) -> Result<Result<User, Step>, ConversationError> {
        Ok(match self.account(session).await? {
            Account::NotLinked => Err(Step::reply(texts::NOT_LINKED).then(ConversationState::Idle)),
            Account::Missing => {
                Err(Step::reply(texts::LINKED_USER_MISSING).then(ConversationState::Idle))
            }
            Account::Found(user) => Ok(*user),
        })
    }

    async fn open_wishlist_editor(&self, session: &Session) -> Result<Step, ConversationError> {
        let user = match self.configurable(session).await? {
            Ok(user) => user,
            Err(refusal) => return Ok(refusal),
        };
        let quota = user.config.plan.quota();
        if !quota.wishlist_allowed {
            return Ok(Step::reply(texts::WISHLIST_NOT_ALLOWED).then(ConversationState::Idle));
        }

        Ok(Step::replies(vec![
            Reply::text(texts::wishlist_help(self.settings, &quota)),
            Reply::text(texts::current_wishlist(&user.config.wishlist)),
            Reply::text(texts::WISHLIST_PROMPT),
        ]))
    }

    async fn submit_wishlist(&self, session: &Session, text: &str) -> Result<Step, ConversationError> {
        let user = match self.configurable(session).await? {
            Ok(user) => user,
            Err(refusal) => return Ok(refusal),
        };
        let plan = user.config.plan;

        if let Err(e) = wishlist::parse(text, &plan.quota()) {
            tracing::info!(user = %user.email, error = %e, "Wishlist rejected");
            return Ok(wishlist_rejected(plan, e));
        }

        let update = ConfigUpdate::Wishlist(wishlist::normalize(text));
        if !self.users.set_config_field(user.id, update).await? {
            return Err(ConversationError::NotAcknowledged("updating the wishlist"));
        }
        tracing::info!(user = %user.email, "Wishlist updated");
        Ok(Step::reply(texts::CONFIG_UPDATED))
    }

    async fn open_auto_checkout_menu(&self, session: &Session) -> Result<Step, ConversationError> {
        let user = match self.configurable(session).await? {
            Ok(user) => user,
            Err(refusal) => return Ok(refusal),
        };
        if !user.config.plan.quota().auto_checkout_allowed {
            return Ok(Step::reply(texts::AUTO_CHECKOUT_NOT_ALLOWED).then(ConversationState::Idle));
        }

        Ok(Step::replies(vec![Reply::Menu {
            text: texts::auto_checkout_menu(user.config.auto_checkout),
            rows: vec![
                vec![
                    Button::new("On", CallbackAction::AutoCheckoutOn),
                    Button::new("Off", CallbackAction::AutoCheckoutOff),
                ],
                vec![Button::new("Exit", CallbackAction::AutoCheckoutExit)],
            ],
        }]))
    }

    async fn set_auto_checkout(
        &self,
        session: &Session,
        enabled: bool,
    ) -> Result<Step, ConversationError> {
        let user = match self.configurable(session).await? {
            Ok(user) => user,
            Err(refusal) => return Ok(refusal),
        };
        // The plan may have changed since the menu was opened.
        if enabled && !user.config.plan.quota().auto_checkout_allowed {
            return Ok(Step::reply(texts::AUTO_CHECKOUT_NOT_ALLOWED));
        }

        let update = ConfigUpdate::AutoCheckout(enabled);
        if !self.users.set_config_field(user.id, update).await? {
            return Err(ConversationError::NotAcknowledged("updating auto-checkout"));
        }
        tracing::info!(user = %user.email, enabled, "Auto-checkout updated");
        Ok(Step::reply(texts::CONFIG_UPDATED))
    }

    // =========================================================================
    // Payments
    // =========================================================================

    fn send_invoice(&self, session: &mut Session, command: Command) -> Step {
        let plan = match command {
            Command::ExtendPremium => Plan::Premium,
            _ => Plan::Basic,
        };
        let Some(email) = &session.linked_email else {
            return Step::reply(texts::EXTEND_NOT_LINKED);
        };
        let Some(invoice) = payments::extension_invoice(email, plan, self.settings) else {
            return Step::reply(texts::UNKNOWN);
        };

        tracing::info!(user = %email, %plan, "Invoice sent");
        session.awaiting_payment = Some(plan);
        Step::replies(vec![Reply::Invoice(invoice)])
    }

    async fn confirm_payment(&self, session: &mut Session, payload: &str, today: NaiveDate) -> Step {
        match payments::confirm_payment(self.users, payload, today).await {
            Ok(extension) => {
                session.awaiting_payment = None;
                let mut replies = vec![Reply::text(texts::PAYMENT_SUCCEEDED)];
                if let Some(wishlist) = &extension.wishlist {
                    replies.push(Reply::text(texts::wishlist_trimmed(
                        extension.plan,
                        wishlist,
                    )));
                }
                Step::replies(replies)
            }
            Err(e) => {
                tracing::error!(error = %e, payload, "Payment received but not applied");
                Step::reply(texts::PAYMENT_FAILED)
            }
        }
    }
}

fn start_configure(session: &Session) -> Step {
    if !session.is_linked() {
        return Step::reply(texts::NOT_LINKED).then(ConversationState::Idle);
    }
    Step::replies(vec![Reply::Menu {
        text: texts::CONFIGURE_MENU.to_owned(),
        rows: vec![
            vec![Button::new("Configure wish-list", CallbackAction::ConfigureWishlist)],
            vec![Button::new("Configure auto-checkout", CallbackAction::ConfigureAutoCheckout)],
            vec![Button::new("Done", CallbackAction::ConfigureDone)],
        ],
    }])
}

fn wishlist_rejected(plan: Plan, error: WishlistError) -> Step {
    match error {
        WishlistError::NotAllowed => {
            Step::reply(texts::WISHLIST_NOT_ALLOWED).then(ConversationState::Idle)
        }
        WishlistError::TooManyItems { max, .. } => {
            let mut replies = vec![Reply::text(texts::too_many_items(plan, max))];
            if plan == Plan::Basic {
                replies.push(Reply::text(texts::PREMIUM_QUOTA_HINT));
            }
            Step::replies(replies).then(ConversationState::AwaitingWishlist)
        }
        WishlistError::InvalidLine { line } => {
            Step::reply(texts::invalid_line(&line)).then(ConversationState::AwaitingWishlist)
        }
        WishlistError::DuplicateItem { item_id, .. } => {
            Step::reply(texts::duplicate_item(&item_id)).then(ConversationState::AwaitingWishlist)
        }
    }
}

/// Accept only the invoice last sent to this chat, for the linked account.
fn pre_checkout(session: &Session, payload: &str) -> Step {
    let accepted = InvoicePayload::parse(payload).is_some_and(|invoice| {
        session.linked_email.as_ref() == Some(&invoice.email)
            && session.awaiting_payment == Some(invoice.plan)
    });
    if !accepted {
        tracing::warn!(payload, "Rejecting pre-checkout");
    }
    Step::replies(vec![Reply::PreCheckout {
        ok: accepted,
        error_message: (!accepted).then(|| texts::PAYMENT_REJECTED.to_owned()),
    }])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use plantwatch_core::testing::{MemoryUserStore, UserBuilder};
    use plantwatch_core::StoreError;

    use super::*;

    const CHAT: i64 = 4242;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> MemoryUserStore {
        MemoryUserStore::new(vec![
            UserBuilder::new(1, "grower@example.com")
                .real_name("Ada Grower")
                .plan(Plan::Premium)
                .wishlist("PIE2081;1")
                .build(),
            UserBuilder::new(2, "basic@example.com")
                .plan(Plan::Basic)
                .auto_checkout(true)
                .build(),
            UserBuilder::new(3, "lapsed@example.com").build(),
        ])
    }

    fn linked(email: &str) -> Session {
        Session {
            linked_email: Some(Email::parse(email).unwrap()),
            ..Session::default()
        }
    }

    async fn send(store: &MemoryUserStore, session: &Session, event: Event) -> Transition {
        let settings = BotSettings::default();
        Conversation::new(store, &settings)
            .handle(ChatId::new(CHAT), session, event, date(2024, 1, 31))
            .await
            .unwrap()
    }

    async fn send_text(store: &MemoryUserStore, session: &Session, text: &str) -> Transition {
        send(store, session, Event::from_text(text)).await
    }

    fn texts_of(transition: &Transition) -> Vec<&str> {
        transition.replies.iter().filter_map(Reply::as_text).collect()
    }

    #[tokio::test]
    async fn test_link_flow() {
        let store = store();
        let t = send_text(&store, &Session::default(), "/link").await;
        assert_eq!(t.session.state, ConversationState::AwaitingEmail);

        let t = send_text(&store, &t.session, "grower@example.com").await;
        assert_eq!(t.session.state, ConversationState::Idle);
        assert_eq!(t.session.linked_email.as_ref().unwrap().as_str(), "grower@example.com");
        assert!(texts_of(&t)[0].contains("Ada Grower"));
        assert_eq!(store.user(1).unwrap().linked_chat_id, Some(ChatId::new(CHAT)));
    }

    #[tokio::test]
    async fn test_link_reprompts_without_at_sign() {
        let store = store();
        let session = Session::default().with_state(ConversationState::AwaitingEmail);
        let t = send_text(&store, &session, "grower").await;

        assert_eq!(t.session.state, ConversationState::AwaitingEmail);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_link_unknown_address_keeps_it_pending() {
        let store = store();
        let session = Session::default().with_state(ConversationState::AwaitingEmail);
        let t = send_text(&store, &session, "stranger@example.com").await;

        assert_eq!(t.session.state, ConversationState::Idle);
        assert!(!t.session.is_linked());
        assert_eq!(t.session.pending_email.as_deref(), Some("stranger@example.com"));
        assert!(texts_of(&t)[0].contains("registered"));
    }

    #[tokio::test]
    async fn test_link_when_already_linked_is_refused() {
        let store = store();
        let t = send_text(&store, &linked("grower@example.com"), "/link").await;

        assert_eq!(t.session.state, ConversationState::Idle);
        assert!(texts_of(&t)[0].contains("grower@example.com"));
    }

    #[tokio::test]
    async fn test_unlink() {
        let store = store();
        let t = send_text(&store, &Session::default(), "/link").await;
        let t = send_text(&store, &t.session, "grower@example.com").await;

        let t = send_text(&store, &t.session, "/unlink").await;
        assert!(!t.session.is_linked());
        assert_eq!(store.user(1).unwrap().linked_chat_id, None);

        let t = send_text(&store, &t.session, "/unlink").await;
        assert_eq!(texts_of(&t), vec![texts::UNLINK_NOT_LINKED]);
    }

    #[tokio::test]
    async fn test_configure_requires_link() {
        let store = store();
        let t = send_text(&store, &Session::default(), "/configure").await;

        assert_eq!(t.session.state, ConversationState::Idle);
        assert_eq!(texts_of(&t), vec![texts::NOT_LINKED]);
    }

    #[tokio::test]
    async fn test_configure_wishlist_round_trip() {
        let store = store();
        let t = send_text(&store, &linked("grower@example.com"), "/configure").await;
        assert_eq!(t.session.state, ConversationState::SelectingAction);
        assert!(matches!(t.replies[0], Reply::Menu { .. }));

        let t = send(
            &store,
            &t.session,
            Event::Callback(CallbackAction::ConfigureWishlist),
        )
        .await;
        assert_eq!(t.session.state, ConversationState::AwaitingWishlist);
        assert_eq!(t.replies.len(), 3);
        assert!(texts_of(&t)[1].contains("PIE2081;1"));

        let t = send_text(&store, &t.session, "PIE2081;2  \n471110\n").await;
        assert_eq!(t.session.state, ConversationState::Idle);
        assert_eq!(texts_of(&t), vec![texts::CONFIG_UPDATED]);
        assert_eq!(store.user(1).unwrap().config.wishlist, "PIE2081;2\n471110");
    }

    #[tokio::test]
    async fn test_empty_wishlist_is_stored_as_empty_string() {
        let store = store();
        let session = linked("grower@example.com").with_state(ConversationState::AwaitingWishlist);
        send_text(&store, &session, "NA").await;

        assert_eq!(store.user(1).unwrap().config.wishlist, "");
    }

    #[tokio::test]
    async fn test_invalid_wishlist_stays_in_editor() {
        let store = store();
        let session = linked("grower@example.com").with_state(ConversationState::AwaitingWishlist);

        let t = send_text(&store, &session, "PIE2081;9").await;
        assert_eq!(t.session.state, ConversationState::AwaitingWishlist);
        assert!(texts_of(&t)[0].contains("PIE2081;9"));

        let t = send_text(&store, &session, "PIE2081\nPIE2081;1").await;
        assert_eq!(t.session.state, ConversationState::AwaitingWishlist);
        assert!(texts_of(&t)[0].contains("PIE2081"));

        assert_eq!(store.user(1).unwrap().config.wishlist, "PIE2081;1");
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_basic_overflow_suggests_premium() {
        let store = store();
        let session = linked("basic@example.com").with_state(ConversationState::AwaitingWishlist);
        let t = send_text(&store, &session, "AAAAA\nBBBBB\nCCCCC\nDDDDD").await;

        assert_eq!(t.session.state, ConversationState::AwaitingWishlist);
        assert_eq!(t.replies.len(), 2);
        assert_eq!(texts_of(&t)[1], texts::PREMIUM_QUOTA_HINT);
    }

    #[tokio::test]
    async fn test_no_plan_cannot_edit_wishlist() {
        let store = store();
        let session = linked("lapsed@example.com").with_state(ConversationState::SelectingAction);
        let t = send(&store, &session, Event::Callback(CallbackAction::ConfigureWishlist)).await;

        assert_eq!(t.session.state, ConversationState::Idle);
        assert_eq!(texts_of(&t), vec![texts::WISHLIST_NOT_ALLOWED]);
    }

    #[tokio::test]
    async fn test_basic_cannot_open_auto_checkout() {
        let store = store();
        let session = linked("basic@example.com").with_state(ConversationState::SelectingAction);
        let t = send(
            &store,
            &session,
            Event::Callback(CallbackAction::ConfigureAutoCheckout),
        )
        .await;

        assert_eq!(t.session.state, ConversationState::Idle);
        assert_eq!(texts_of(&t), vec![texts::AUTO_CHECKOUT_NOT_ALLOWED]);
    }

    #[tokio::test]
    async fn test_auto_checkout_toggle() {
        let store = store();
        let session = linked("grower@example.com").with_state(ConversationState::SelectingAction);
        let t = send(
            &store,
            &session,
            Event::Callback(CallbackAction::ConfigureAutoCheckout),
        )
        .await;
        assert_eq!(t.session.state, ConversationState::AwaitingAutoCheckout);
        assert!(texts_of(&t)[0].contains("Auto-checkout off"));

        let t = send(&store, &t.session, Event::Callback(CallbackAction::AutoCheckoutOn)).await;
        assert_eq!(t.session.state, ConversationState::Idle);
        assert!(store.user(1).unwrap().config.auto_checkout);
    }

    #[tokio::test]
    async fn test_auto_checkout_exit_writes_nothing() {
        let store = store();
        let session =
            linked("grower@example.com").with_state(ConversationState::AwaitingAutoCheckout);
        let t = send(&store, &session, Event::Callback(CallbackAction::AutoCheckoutExit)).await;

        assert_eq!(t.session.state, ConversationState::Idle);
        assert_eq!(texts_of(&t), vec![texts::BYE]);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_stale_button_is_ignored() {
        let store = store();
        let session = linked("grower@example.com");
        let t = send(&store, &session, Event::Callback(CallbackAction::AutoCheckoutOn)).await;

        assert_eq!(t.session, session);
        assert!(t.replies.is_empty());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_from_any_state() {
        let store = store();
        let session = linked("grower@example.com").with_state(ConversationState::AwaitingWishlist);
        let t = send_text(&store, &session, "/cancel").await;

        assert_eq!(t.session.state, ConversationState::Idle);
        assert_eq!(texts_of(&t), vec![texts::CANCEL]);
    }

    #[tokio::test]
    async fn test_unknown_input_points_to_help() {
        let store = store();
        let t = send_text(&store, &Session::default(), "/frobnicate").await;
        assert_eq!(texts_of(&t), vec![texts::UNKNOWN]);

        let t = send_text(&store, &Session::default(), "hello").await;
        assert_eq!(texts_of(&t), vec![texts::UNKNOWN]);
    }

    #[tokio::test]
    async fn test_user_info() {
        let store = store();
        let t = send_text(&store, &linked("grower@example.com"), "/userinfo").await;
        assert!(texts_of(&t)[0].contains("premium"));

        let t = send_text(&store, &linked("gone@example.com"), "/userinfo").await;
        assert_eq!(texts_of(&t), vec![texts::LINKED_USER_MISSING]);
    }

    #[tokio::test]
    async fn test_extend_requires_link() {
        let store = store();
        let t = send_text(&store, &Session::default(), "/extendbasic").await;

        assert_eq!(texts_of(&t), vec![texts::EXTEND_NOT_LINKED]);
        assert_eq!(t.session.awaiting_payment, None);
    }

    #[tokio::test]
    async fn test_payment_flow() {
        let store = store();
        let t = send_text(&store, &linked("basic@example.com"), "/extendbasic").await;
        let Reply::Invoice(invoice) = &t.replies[0] else {
            panic!("expected an invoice, got {:?}", t.replies);
        };
        assert_eq!(t.session.awaiting_payment, Some(Plan::Basic));
        let payload = invoice.payload.clone();

        let t = send(
            &store,
            &t.session,
            Event::PreCheckout {
                payload: payload.clone(),
            },
        )
        .await;
        assert_eq!(
            t.replies,
            vec![Reply::PreCheckout {
                ok: true,
                error_message: None
            }]
        );

        let t = send(&store, &t.session, Event::PaymentSucceeded { payload }).await;
        assert_eq!(texts_of(&t), vec![texts::PAYMENT_SUCCEEDED]);
        assert_eq!(t.session.awaiting_payment, None);

        let user = store.user(2).unwrap();
        assert_eq!(user.config.plan, Plan::Basic);
        assert_eq!(user.expiry_date, Some(date(2024, 2, 29)));
        assert!(!user.config.auto_checkout);
    }

    #[tokio::test]
    async fn test_pre_checkout_rejects_foreign_payload() {
        let store = store();
        let session = linked("grower@example.com");

        let t = send(
            &store,
            &session,
            Event::PreCheckout {
                payload: "username: basic@example.com; extension; basic".to_owned(),
            },
        )
        .await;
        assert_eq!(
            t.replies,
            vec![Reply::PreCheckout {
                ok: false,
                error_message: Some(texts::PAYMENT_REJECTED.to_owned())
            }]
        );
    }

    #[tokio::test]
    async fn test_pre_checkout_requires_pending_invoice() {
        let store = store();
        let payload = "username: grower@example.com; extension; premium".to_owned();
        let rejected = vec![Reply::PreCheckout {
            ok: false,
            error_message: Some(texts::PAYMENT_REJECTED.to_owned()),
        }];

        let t = send(
            &store,
            &linked("grower@example.com"),
            Event::PreCheckout {
                payload: payload.clone(),
            },
        )
        .await;
        assert_eq!(t.replies, rejected);

        // A newer invoice for another tier replaces the pending one.
        let session = Session {
            awaiting_payment: Some(Plan::Basic),
            ..linked("grower@example.com")
        };
        let t = send(&store, &session, Event::PreCheckout { payload }).await;
        assert_eq!(t.replies, rejected);
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_user_unchanged() {
        let store = store();
        store.fail_writes(StoreError::Unavailable("db down".to_owned()));
        let session = linked("lapsed@example.com").with_state(ConversationState::SelectingAction);

        let t = send(
            &store,
            &session,
            Event::PaymentSucceeded {
                payload: "username: lapsed@example.com; extension; premium".to_owned(),
            },
        )
        .await;
        assert_eq!(texts_of(&t), vec![texts::PAYMENT_FAILED]);
        assert_eq!(t.session.state, ConversationState::SelectingAction);
        assert_eq!(store.user(3).unwrap().config.plan, Plan::None);
        assert_eq!(store.user(3).unwrap().expiry_date, None);
    }

    #[tokio::test]
    async fn test_store_failure_is_an_error() {
        let store = store();
        store.fail_all(StoreError::Unavailable("db down".to_owned()));
        let settings = BotSettings::default();
        let session = Session::default().with_state(ConversationState::AwaitingEmail);

        let result = Conversation::new(&store, &settings)
            .handle(
                ChatId::new(CHAT),
                &session,
                Event::from_text("grower@example.com"),
                date(2024, 1, 31),
            )
            .await;
        assert!(matches!(result, Err(ConversationError::Store(_))));
    }
}
