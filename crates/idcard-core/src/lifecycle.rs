//! Status transitions and date-derived validity.
//!
//! The stored status moves along a small state machine:
//!
//! ```text
//! pending ──► active ──► generated ──► expired
//!    │          │  ▲          │
//!    │          ▼  │          ▼
//!    └──────► suspended ◄─────┘
//! ```
//!
//! `pending` may also go straight to `generated`, and `expired` returns to
//! `active` only through a renewal (an update carrying a new `valid_until`).
//!
//! Validity is never stored: it is recomputed from `valid_from`, `valid_until`
//! and the current date on every read.

use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, card::CardStatus};

// ─── Transitions ─────────────────────────────────────────────────────────────

impl CardStatus {
  /// Whether a card in `self` may move to `to`. Staying put is always legal.
  pub fn can_transition_to(self, to: CardStatus) -> bool {
    use CardStatus::*;
    self == to
      || matches!(
        (self, to),
        (Pending, Active | Generated | Suspended)
          | (Active, Generated | Suspended | Expired)
          | (Generated, Suspended | Expired)
          | (Suspended, Active)
          | (Expired, Active)
      )
  }

  /// Statuses a bulk transition to `self` may move cards out of.
  ///
  /// Renewals and generation need per-card data, so `expired → active` and
  /// anything `→ generated` never happen in bulk.
  pub fn bulk_sources(self) -> Vec<CardStatus> {
    if self == CardStatus::Generated {
      return Vec::new();
    }
    CardStatus::ALL
      .into_iter()
      .filter(|&from| from != self && from != CardStatus::Expired)
      .filter(|&from| from.can_transition_to(self))
      .collect()
  }
}

// ─── Bulk actions ────────────────────────────────────────────────────────────

/// An operator action applied to a batch of cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
  Activate,
  Deactivate,
  Delete,
}

impl BulkAction {
  /// The status the action moves cards to; `None` for removal.
  pub fn target(self) -> Option<CardStatus> {
    match self {
      Self::Activate => Some(CardStatus::Active),
      Self::Deactivate => Some(CardStatus::Suspended),
      Self::Delete => None,
    }
  }
}

impl FromStr for BulkAction {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "activate" => Ok(Self::Activate),
      "deactivate" => Ok(Self::Deactivate),
      "delete" => Ok(Self::Delete),
      other => Err(Error::UnknownBulkAction(other.to_owned())),
    }
  }
}

// ─── Validity ────────────────────────────────────────────────────────────────

/// Date-derived classification of a card's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Validity {
  /// `valid_until` is strictly before today.
  pub is_expired:       bool,
  /// Not expired, but `valid_until` falls inside the warning window.
  pub is_expiring_soon: bool,
  /// Whole days from today to `valid_until`; negative once expired.
  pub days_remaining:   i64,
  /// Share of the window already used, clamped to `0..=100`.
  pub progress_percent: f64,
}

impl Validity {
  pub fn classify(
    valid_from: NaiveDate,
    valid_until: NaiveDate,
    today: NaiveDate,
    soon_days: u32,
  ) -> Self {
    let is_expired = valid_until < today;
    let soon_limit = today
      .checked_add_days(Days::new(u64::from(soon_days)))
      .unwrap_or(NaiveDate::MAX);
    let is_expiring_soon = !is_expired && valid_until < soon_limit;

    let days_remaining = (valid_until - today).num_days();

    let total_days = (valid_until - valid_from).num_days();
    let used_days = (today - valid_from).num_days();
    let progress_percent = if total_days <= 0 {
      100.0
    } else {
      (used_days as f64 / total_days as f64 * 100.0).clamp(0.0, 100.0)
    };

    Self { is_expired, is_expiring_soon, days_remaining, progress_percent }
  }
}
