//! Plan extension payments.
//!
//! An invoice carries an opaque payload naming the account and tier. The
//! pre-checkout hook only accepts payloads it can parse back, and the
//! successful-payment hook is the only code path that extends a plan.

use chrono::{Months, NaiveDate};
use thiserror::Error;

use plantwatch_core::types::wishlist;
use plantwatch_core::{Email, Plan, PlanExtension, Price, StoreError, UserStore};

use crate::config::BotSettings;

const PAYLOAD_PREFIX: &str = "username: ";
const EXTENSION_INTENT: &str = "extension";

/// Errors while applying a confirmed payment.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("unrecognized invoice payload: {0}")]
    UnknownPayload(String),

    #[error("no user with email {0}")]
    UnknownUser(Email),

    #[error("payment for {0} was not applied")]
    NotApplied(Email),

    #[error("cannot extend past {0}")]
    DateOutOfRange(NaiveDate),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What an invoice is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoicePayload {
    pub email: Email,
    /// Paid tier, never [`Plan::None`].
    pub plan: Plan,
}

impl InvoicePayload {
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{PAYLOAD_PREFIX}{}; {EXTENSION_INTENT}; {}",
            self.email,
            self.plan.as_str()
        )
    }

    /// Parse a payload produced by [`InvoicePayload::encode`].
    #[must_use]
    pub fn parse(payload: &str) -> Option<Self> {
        let rest = payload.strip_prefix(PAYLOAD_PREFIX)?;
        let mut parts = rest.split("; ");
        let email = Email::parse(parts.next()?).ok()?;
        if parts.next()? != EXTENSION_INTENT {
            return None;
        }
        let plan = parts.next()?.parse::<Plan>().ok()?;
        if parts.next().is_some() || plan == Plan::None {
            return None;
        }
        Some(Self { email, plan })
    }
}

/// An invoice ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub title: String,
    pub description: String,
    pub payload: String,
    pub label: String,
    pub price: Price,
}

/// Invoice for one month of `plan` on the account `email`.
///
/// Returns `None` for [`Plan::None`], which cannot be bought.
#[must_use]
pub fn extension_invoice(email: &Email, plan: Plan, settings: &BotSettings) -> Option<Invoice> {
    let price = plan.extension_price(settings.currency)?;
    let tier = plan.as_str();
    Some(Invoice {
        title: format!("Account Extension ({} plan)", plan.title()),
        description: format!(
            "Extend your ({email}) {} bot account validity by one more month from today \
             ({tier} plan). See {} for details.",
            settings.shop_name, settings.pricing_url
        ),
        payload: InvoicePayload {
            email: email.clone(),
            plan,
        }
        .encode(),
        label: format!("1-month account extension ({tier})"),
        price,
    })
}

/// The stored change for a payment of `plan` made on `paid_on`.
///
/// Expiry is one calendar month after the payment date. The account must
/// fit the paid plan afterwards: basic cannot hold auto-checkout, and a
/// wishlist longer than the plan allows is cut to its first lines.
///
/// # Errors
///
/// Returns `PaymentError::DateOutOfRange` if the date cannot be extended.
pub fn plan_extension(
    plan: Plan,
    paid_on: NaiveDate,
    current_wishlist: &str,
) -> Result<PlanExtension, PaymentError> {
    let expiry_date = paid_on
        .checked_add_months(Months::new(1))
        .ok_or(PaymentError::DateOutOfRange(paid_on))?;
    let quota = plan.quota();
    Ok(PlanExtension {
        plan,
        expiry_date,
        auto_checkout: (!quota.auto_checkout_allowed).then_some(false),
        wishlist: wishlist::truncate(current_wishlist, quota.max_items),
    })
}

/// Apply a successful payment.
///
/// Plan, expiry and auto-checkout are written in one store call, so a
/// failure leaves the previous values in place.
///
/// # Errors
///
/// Returns `PaymentError` if the payload is not ours, the account is gone,
/// or the store fails or does not acknowledge the write.
pub async fn confirm_payment(
    store: &dyn UserStore,
    payload: &str,
    paid_on: NaiveDate,
) -> Result<PlanExtension, PaymentError> {
    let InvoicePayload { email, plan } = InvoicePayload::parse(payload)
        .ok_or_else(|| PaymentError::UnknownPayload(payload.to_owned()))?;
    let user = store
        .find_by_email(&email)
        .await?
        .ok_or_else(|| PaymentError::UnknownUser(email.clone()))?;

    let extension = plan_extension(plan, paid_on, &user.config.wishlist)?;
    if !store.apply_plan_extension(user.id, &extension).await? {
        return Err(PaymentError::NotApplied(email));
    }

    tracing::info!(
        user = %email,
        plan = %plan,
        expiry_date = %extension.expiry_date,
        wishlist_trimmed = extension.wishlist.is_some(),
        "Plan extended"
    );
    Ok(extension)
}
