//! Identity-card types, the entity owned by the card store.
//!
//! A card is issued to exactly one holder, carries a globally unique card
//! number, and is current only inside its validity window. Everything derived
//! from dates (expiry, remaining days) lives in [`crate::lifecycle`] and is
//! never stored.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{holder::Holder, lifecycle::Validity};

// ─── Identifiers ─────────────────────────────────────────────────────────────

pub type CardId = Uuid;
pub type HolderId = Uuid;

/// The operator performing a mutation, supplied by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ActorId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Which population a card is issued for.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CardType {
  Student,
  Staff,
  Visitor,
}

/// Stored lifecycle status. Legal moves between statuses are defined by
/// [`CardStatus::can_transition_to`].
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CardStatus {
  #[default]
  Pending,
  Active,
  Generated,
  Suspended,
  Expired,
}

impl CardStatus {
  pub const ALL: [CardStatus; 5] = [
    Self::Pending,
    Self::Active,
    Self::Generated,
    Self::Suspended,
    Self::Expired,
  ];

  /// Statuses that count towards the one-current-card-per-holder rule.
  pub const CURRENT: [CardStatus; 2] = [Self::Active, Self::Generated];

  pub fn is_current(self) -> bool { Self::CURRENT.contains(&self) }
}

// ─── IdentityCard ────────────────────────────────────────────────────────────

/// A persisted identity card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityCard {
  pub id:            CardId,
  pub holder_id:     HolderId,
  pub card_type:     CardType,
  /// Immutable after creation; see [`crate::number`].
  pub card_number:   String,
  pub valid_from:    NaiveDate,
  pub valid_until:   NaiveDate,
  pub status:        CardStatus,
  pub notes:         Option<String>,
  /// Relative location of the rendered artifact; only set once generated.
  pub artifact_path: Option<String>,
  pub created_by:    ActorId,
  pub updated_by:    Option<ActorId>,
  pub generated_by:  Option<ActorId>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    Option<DateTime<Utc>>,
  pub generated_at:  Option<DateTime<Utc>>,
}

/// A card as read back from the store, joined with its holder's attributes.
/// The holder is `None` when the reference is dangling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCard {
  #[serde(flatten)]
  pub card:   IdentityCard,
  pub holder: Option<Holder>,
}

/// The read model handed to callers: a stored card plus its validity
/// classification for the current date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardView {
  #[serde(flatten)]
  pub card:     IdentityCard,
  pub holder:   Option<Holder>,
  pub validity: Validity,
}

/// A card that expires soon, annotated with the remaining days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiringCard {
  #[serde(flatten)]
  pub view:              CardView,
  pub days_until_expiry: i64,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Operator input for [`crate::engine::LifecycleEngine::create`].
///
/// Required fields are optional here so the engine can report which one is
/// missing rather than failing at deserialisation.
#[derive(Debug, Clone, Default)]
pub struct CardDraft {
  pub holder_id:   Option<HolderId>,
  pub card_type:   Option<CardType>,
  pub valid_from:  Option<NaiveDate>,
  pub valid_until: Option<NaiveDate>,
  pub status:      Option<CardStatus>,
  pub notes:       Option<String>,
}

/// A fully validated card ready to be inserted. `id` and `created_at` are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewCard {
  pub holder_id:   HolderId,
  pub card_type:   CardType,
  pub card_number: String,
  pub valid_from:  NaiveDate,
  pub valid_until: NaiveDate,
  pub status:      CardStatus,
  pub notes:       Option<String>,
  pub created_by:  ActorId,
}

/// A partial update restricted to the mutable columns.
///
/// Fields wrapped in a double `Option` distinguish "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPatch {
  pub card_type:     Option<CardType>,
  pub valid_from:    Option<NaiveDate>,
  pub valid_until:   Option<NaiveDate>,
  pub status:        Option<CardStatus>,
  pub notes:         Option<Option<String>>,
  pub artifact_path: Option<Option<String>>,
  pub generated_at:  Option<Option<DateTime<Utc>>>,
  pub generated_by:  Option<Option<ActorId>>,
}

impl CardPatch {
  pub fn is_empty(&self) -> bool { *self == Self::default() }

  /// Apply the patch on top of `card`, returning the merged result. Used to
  /// validate the state the card would end up in.
  pub fn merged_onto(&self, card: &IdentityCard) -> IdentityCard {
    let mut merged = card.clone();
    if let Some(t) = self.card_type {
      merged.card_type = t;
    }
    if let Some(d) = self.valid_from {
      merged.valid_from = d;
    }
    if let Some(d) = self.valid_until {
      merged.valid_until = d;
    }
    if let Some(s) = self.status {
      merged.status = s;
    }
    if let Some(n) = &self.notes {
      merged.notes = n.clone();
    }
    if let Some(p) = &self.artifact_path {
      merged.artifact_path = p.clone();
    }
    if let Some(at) = self.generated_at {
      merged.generated_at = at;
    }
    if let Some(by) = &self.generated_by {
      merged.generated_by = by.clone();
    }
    merged
  }

  /// Clear every artifact-related column.
  pub fn clearing_artifact(mut self) -> Self {
    self.artifact_path = Some(None);
    self.generated_at = Some(None);
    self.generated_by = Some(None);
    self
  }
}

/// Who made a change, and when.
#[derive(Debug, Clone)]
pub struct Stamp {
  pub actor: ActorId,
  pub at:    DateTime<Utc>,
}
