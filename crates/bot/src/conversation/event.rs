//! Inputs of the conversation state machine.

/// A slash command understood by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Help,
    Link,
    Unlink,
    Configure,
    UserInfo,
    ExtendBasic,
    ExtendPremium,
    Support,
    Cancel,
}

impl Command {
    pub const ALL: [Self; 10] = [
        Self::Start,
        Self::Help,
        Self::Link,
        Self::Unlink,
        Self::Configure,
        Self::UserInfo,
        Self::ExtendBasic,
        Self::ExtendPremium,
        Self::Support,
        Self::Cancel,
    ];

    /// Command name without the leading slash.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Link => "link",
            Self::Unlink => "unlink",
            Self::Configure => "configure",
            Self::UserInfo => "userinfo",
            Self::ExtendBasic => "extendbasic",
            Self::ExtendPremium => "extendpremium",
            Self::Support => "support",
            Self::Cancel => "cancel",
        }
    }

    /// One-line description for the bot's command menu.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Start => "Say hello",
            Self::Help => "Show this help",
            Self::Link => "Link your Telegram account with your registered email",
            Self::Unlink => "Unlink your Telegram account to stop receiving notifications",
            Self::Configure => "Configure settings (e.g. wish-list, auto-checkout)",
            Self::UserInfo => "Show information about your user",
            Self::ExtendBasic => "Extend service (basic plan)",
            Self::ExtendPremium => "Extend service (premium plan)",
            Self::Support => "Get support",
            Self::Cancel => "Abort the current conversation",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(name))
    }
}

/// Inline keyboard button presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackAction {
    ConfigureWishlist,
    ConfigureAutoCheckout,
    ConfigureDone,
    AutoCheckoutOn,
    AutoCheckoutOff,
    AutoCheckoutExit,
}

impl CallbackAction {
    const ALL: [Self; 6] = [
        Self::ConfigureWishlist,
        Self::ConfigureAutoCheckout,
        Self::ConfigureDone,
        Self::AutoCheckoutOn,
        Self::AutoCheckoutOff,
        Self::AutoCheckoutExit,
    ];

    /// Callback data attached to the button.
    #[must_use]
    pub const fn data(self) -> &'static str {
        match self {
            Self::ConfigureWishlist => "cfg:wishlist",
            Self::ConfigureAutoCheckout => "cfg:auto_checkout",
            Self::ConfigureDone => "cfg:done",
            Self::AutoCheckoutOn => "ac:on",
            Self::AutoCheckoutOff => "ac:off",
            Self::AutoCheckoutExit => "ac:exit",
        }
    }

    #[must_use]
    pub fn from_data(data: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.data() == data)
    }
}

/// One update from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(Command),
    /// A slash command the bot does not know.
    UnknownCommand(String),
    Text(String),
    Callback(CallbackAction),
    /// The payment provider asks whether to accept a payment.
    PreCheckout { payload: String },
    PaymentSucceeded { payload: String },
}

impl Event {
    /// Classify a text message.
    ///
    /// Commands may carry the bot's username (`/link@some_bot`) and
    /// trailing arguments, which are ignored.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Text(text.to_owned());
        };
        let word = rest.split_whitespace().next().unwrap_or_default();
        let name = word.split_once('@').map_or(word, |(name, _)| name);
        Command::from_name(name).map_or_else(|| Self::UnknownCommand(word.to_owned()), Self::Command)
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Command(command) => EventKind::Command(*command),
            Self::UnknownCommand(_) => EventKind::UnknownCommand,
            Self::Text(_) => EventKind::Text,
            Self::Callback(action) => EventKind::Callback(*action),
            Self::PreCheckout { .. } => EventKind::PreCheckout,
            Self::PaymentSucceeded { .. } => EventKind::PaymentSucceeded,
        }
    }
}

/// [`Event`] without its payload, used to look up transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Command(Command),
    UnknownCommand,
    Text,
    Callback(CallbackAction),
    PreCheckout,
    PaymentSucceeded,
}
