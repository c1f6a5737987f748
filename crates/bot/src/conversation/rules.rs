//! Transition table of the conversation.
//!
//! Each rule maps a `(state, event kind)` pair to the handler that runs and
//! the state the chat moves to afterwards. A handler may override the next
//! state, for example to stay put when input has to be re-entered. Rules are
//! matched in order, so state-specific rules come first.

use super::event::{CallbackAction, Command, EventKind};
use super::state::ConversationState;
use ConversationState::{AwaitingAutoCheckout, AwaitingEmail, AwaitingWishlist, Idle, SelectingAction};
use StateMatch::{Any, Is};

/// Work done for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Greet,
    Help,
    Support,
    Cancel,
    Bye,
    StartLink,
    SubmitEmail,
    Unlink,
    StartConfigure,
    OpenWishlistEditor,
    SubmitWishlist,
    OpenAutoCheckoutMenu,
    SetAutoCheckout,
    UserInfo,
    SendInvoice,
    PreCheckout,
    ConfirmPayment,
    /// Reply with a pointer to `/help`.
    Unknown,
}

/// States a rule applies in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMatch {
    Any,
    Is(ConversationState),
}

impl StateMatch {
    fn matches(self, state: ConversationState) -> bool {
        match self {
            Self::Any => true,
            Self::Is(expected) => expected == state,
        }
    }
}

/// State after the handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Stay,
    To(ConversationState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub state: StateMatch,
    pub event: EventKind,
    pub handler: Handler,
    pub next: Next,
}

const fn rule(state: StateMatch, event: EventKind, handler: Handler, next: Next) -> Rule {
    Rule {
        state,
        event,
        handler,
        next,
    }
}

pub const RULES: &[Rule] = &[
    // Free text answering a question
    rule(Is(AwaitingEmail), EventKind::Text, Handler::SubmitEmail, Next::To(Idle)),
    rule(Is(AwaitingWishlist), EventKind::Text, Handler::SubmitWishlist, Next::To(Idle)),
    // Configure menu
    rule(
        Is(SelectingAction),
        EventKind::Callback(CallbackAction::ConfigureWishlist),
        Handler::OpenWishlistEditor,
        Next::To(AwaitingWishlist),
    ),
    rule(
        Is(SelectingAction),
        EventKind::Callback(CallbackAction::ConfigureAutoCheckout),
        Handler::OpenAutoCheckoutMenu,
        Next::To(AwaitingAutoCheckout),
    ),
    rule(
        Is(SelectingAction),
        EventKind::Callback(CallbackAction::ConfigureDone),
        Handler::Cancel,
        Next::To(Idle),
    ),
    // Auto-checkout menu
    rule(
        Is(AwaitingAutoCheckout),
        EventKind::Callback(CallbackAction::AutoCheckoutOn),
        Handler::SetAutoCheckout,
        Next::To(Idle),
    ),
    rule(
        Is(AwaitingAutoCheckout),
        EventKind::Callback(CallbackAction::AutoCheckoutOff),
        Handler::SetAutoCheckout,
        Next::To(Idle),
    ),
    rule(
        Is(AwaitingAutoCheckout),
        EventKind::Callback(CallbackAction::AutoCheckoutExit),
        Handler::Bye,
        Next::To(Idle),
    ),
    // Commands, valid in every state
    rule(Any, EventKind::Command(Command::Cancel), Handler::Cancel, Next::To(Idle)),
    rule(Any, EventKind::Command(Command::Link), Handler::StartLink, Next::To(AwaitingEmail)),
    rule(Any, EventKind::Command(Command::Unlink), Handler::Unlink, Next::To(Idle)),
    rule(
        Any,
        EventKind::Command(Command::Configure),
        Handler::StartConfigure,
        Next::To(SelectingAction),
    ),
    rule(Any, EventKind::Command(Command::UserInfo), Handler::UserInfo, Next::Stay),
    rule(Any, EventKind::Command(Command::ExtendBasic), Handler::SendInvoice, Next::Stay),
    rule(Any, EventKind::Command(Command::ExtendPremium), Handler::SendInvoice, Next::Stay),
    rule(Any, EventKind::Command(Command::Start), Handler::Greet, Next::Stay),
    rule(Any, EventKind::Command(Command::Help), Handler::Help, Next::Stay),
    rule(Any, EventKind::Command(Command::Support), Handler::Support, Next::Stay),
    // Payments run alongside any conversation
    rule(Any, EventKind::PreCheckout, Handler::PreCheckout, Next::Stay),
    rule(Any, EventKind::PaymentSucceeded, Handler::ConfirmPayment, Next::Stay),
    // Fallbacks
    rule(Any, EventKind::UnknownCommand, Handler::Unknown, Next::Stay),
    rule(Any, EventKind::Text, Handler::Unknown, Next::Stay),
];

/// First rule for `event` in `state`.
///
/// `None` means the event is ignored, which happens for buttons of a menu
/// that is no longer open.
#[must_use]
pub fn lookup(state: ConversationState, event: EventKind) -> Option<&'static Rule> {
    RULES
        .iter()
        .find(|rule| rule.state.matches(state) && rule.event == event)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const STATES: [ConversationState; 5] = [
        Idle,
        AwaitingEmail,
        SelectingAction,
        AwaitingWishlist,
        AwaitingAutoCheckout,
    ];

    #[test]
    fn test_every_command_is_handled_in_every_state() {
        for state in STATES {
            for command in Command::ALL {
                assert!(
                    lookup(state, EventKind::Command(command)).is_some(),
                    "{command:?} in {state:?}"
                );
            }
            assert!(lookup(state, EventKind::Text).is_some());
            assert!(lookup(state, EventKind::PaymentSucceeded).is_some());
        }
    }

    #[test]
    fn test_text_goes_to_the_question_being_asked() {
        assert_eq!(
            lookup(AwaitingEmail, EventKind::Text).unwrap().handler,
            Handler::SubmitEmail
        );
        assert_eq!(
            lookup(AwaitingWishlist, EventKind::Text).unwrap().handler,
            Handler::SubmitWishlist
        );
        assert_eq!(lookup(Idle, EventKind::Text).unwrap().handler, Handler::Unknown);
    }

    #[test]
    fn test_stale_buttons_are_ignored() {
        assert!(lookup(Idle, EventKind::Callback(CallbackAction::ConfigureWishlist)).is_none());
        assert!(
            lookup(SelectingAction, EventKind::Callback(CallbackAction::AutoCheckoutOn)).is_none()
        );
    }

    #[test]
    fn test_cancel_always_returns_to_idle() {
        for state in STATES {
            assert_eq!(
                lookup(state, EventKind::Command(Command::Cancel)).unwrap().next,
                Next::To(Idle)
            );
        }
    }
}
