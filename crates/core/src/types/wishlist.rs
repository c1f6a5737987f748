//! Wishlist text format.
//!
//! A wishlist is stored as free text, one entry per line:
//!
//! ```text
//! PIE2081;1
//! 471110
//! ```
//!
//! `<item-id>` alone means "notify only"; `<item-id>;<quantity>` additionally
//! lets auto-checkout order that many pieces. The literal text is what users
//! see when they edit their wishlist, so it is stored verbatim (trailing
//! whitespace trimmed) and only ever rewritten line-by-line.

use core::borrow::Borrow;
use core::fmt;
use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use super::plan::PlanQuota;

/// Marker for an explicitly empty wishlist.
pub const EMPTY_MARKER: &str = "na";

/// Errors produced when validating a submitted wishlist.
///
/// Any error rejects the whole submission.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WishlistError {
    /// The user's plan does not include a wishlist.
    #[error("wishlist is not included in the current plan")]
    NotAllowed,
    /// More lines than the plan allows.
    #[error("wishlist has {count} items, the maximum is {max}")]
    TooManyItems {
        /// Number of submitted lines.
        count: usize,
        /// Plan limit.
        max: usize,
    },
    /// Bad item id or quantity.
    #[error("invalid format or quantity for line '{line}'")]
    InvalidLine {
        /// The offending line.
        line: String,
    },
    /// The same item id appears more than once.
    #[error("item '{item_id}' is mentioned multiple times")]
    DuplicateItem {
        /// The repeated item id.
        item_id: String,
        /// The line holding the repeated id.
        line: String,
    },
}

impl WishlistError {
    /// The offending line, for errors tied to one line.
    #[must_use]
    pub fn line(&self) -> Option<&str> {
        match self {
            Self::InvalidLine { line } | Self::DuplicateItem { line, .. } => Some(line),
            Self::NotAllowed | Self::TooManyItems { .. } => None,
        }
    }
}

/// Shop item identifier (`[a-zA-Z0-9-]{5,}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Minimum length of an item id.
    pub const MIN_LENGTH: usize = 5;

    /// Validate an item id. Returns `None` if it does not match the pattern.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() >= Self::MIN_LENGTH
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        valid.then(|| Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemId {
    type Error = WishlistError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(WishlistError::InvalidLine { line: value })
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

/// One parsed wishlist line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WishlistEntry {
    pub item_id: ItemId,
    /// Order quantity; `None` means notify only.
    pub quantity: Option<u8>,
}

impl fmt::Display for WishlistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quantity {
            Some(quantity) => write!(f, "{};{quantity}", self.item_id),
            None => write!(f, "{}", self.item_id),
        }
    }
}

/// Returns `true` if the text means "no wishlist".
#[must_use]
pub fn is_empty(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.eq_ignore_ascii_case(EMPTY_MARKER)
}

/// Canonical stored form: trailing whitespace trimmed on every line and at the
/// end, empty string for an empty wishlist.
#[must_use]
pub fn normalize(text: &str) -> String {
    if is_empty(text) {
        return String::new();
    }
    text.trim_end()
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse and validate a wishlist against a plan quota.
///
/// Entries are returned in input order.
///
/// # Errors
///
/// Returns the first violation found, checked in this order: plan does not
/// allow a wishlist, too many lines, malformed line, repeated item id.
pub fn parse(text: &str, quota: &PlanQuota) -> Result<Vec<WishlistEntry>, WishlistError> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    if !quota.wishlist_allowed {
        return Err(WishlistError::NotAllowed);
    }

    let lines: Vec<&str> = normalized.lines().collect();
    if lines.len() > quota.max_items {
        return Err(WishlistError::TooManyItems {
            count: lines.len(),
            max: quota.max_items,
        });
    }

    let mut seen = HashSet::with_capacity(lines.len());
    let mut entries = Vec::with_capacity(lines.len());
    for line in lines {
        let entry = parse_line(line, quota.max_quantity).ok_or_else(|| {
            WishlistError::InvalidLine {
                line: line.to_owned(),
            }
        })?;
        if !seen.insert(entry.item_id.clone()) {
            return Err(WishlistError::DuplicateItem {
                item_id: entry.item_id.into(),
                line: line.to_owned(),
            });
        }
        entries.push(entry);
    }

    Ok(entries)
}

fn parse_line(line: &str, max_quantity: u8) -> Option<WishlistEntry> {
    let Some((id, quantity)) = line.split_once(';') else {
        return ItemId::parse(line).map(|item_id| WishlistEntry {
            item_id,
            quantity: None,
        });
    };

    let item_id = ItemId::parse(id)?;
    let mut digits = quantity.chars();
    let quantity = match (digits.next(), digits.next()) {
        (Some(digit), None) => u8::try_from(digit.to_digit(10)?).ok()?,
        _ => return None,
    };
    (1..=max_quantity).contains(&quantity).then_some(WishlistEntry {
        item_id,
        quantity: Some(quantity),
    })
}

/// Keep the first `max_items` lines, or `None` if the wishlist already fits.
#[must_use]
pub fn truncate(text: &str, max_items: usize) -> Option<String> {
    let normalized = normalize(text);
    if normalized.lines().count() <= max_items {
        return None;
    }
    Some(
        normalized
            .lines()
            .take(max_items)
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Remove the lines whose item id is in `ordered`.
///
/// Untouched lines keep their exact text and their relative order.
#[must_use]
pub fn remove_items(text: &str, ordered: &BTreeSet<ItemId>) -> String {
    normalize(text)
        .lines()
        .filter(|line| {
            let id = line.split_once(';').map_or(*line, |(id, _)| id);
            !ordered.contains(id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
