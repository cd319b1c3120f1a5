//! The `CardStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `idcard-store-sqlite`).
//! The lifecycle engine depends on this abstraction, not on any concrete
//! backend. Stores persist what they are given; business rules live in the
//! engine. The one exception is [`CardStore::insert`], which must perform the
//! current-card and card-number checks atomically with the write.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{
  CardId, CardPatch, CardStatus, CardType, HolderId, IdentityCard, NewCard,
  Stamp, StoredCard,
};

// ─── Filter ──────────────────────────────────────────────────────────────────

/// Typed filter for [`CardStore::list`]. All present fields are AND-combined;
/// `search` itself is an OR over card number, holder name and holder
/// external identifier (case-insensitive substring).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFilter {
  pub search:    Option<String>,
  pub status:    Option<CardStatus>,
  pub card_type: Option<CardType>,
}

impl CardFilter {
  pub fn new() -> Self { Self::default() }

  /// Blank search strings are treated as absent.
  pub fn search(mut self, text: impl Into<String>) -> Self {
    let text = text.into();
    let trimmed = text.trim();
    self.search = (!trimmed.is_empty()).then(|| trimmed.to_owned());
    self
  }

  pub fn status(mut self, status: CardStatus) -> Self {
    self.status = Some(status);
    self
  }

  pub fn card_type(mut self, card_type: CardType) -> Self {
    self.card_type = Some(card_type);
    self
  }

  pub fn is_empty(&self) -> bool { *self == Self::default() }
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// A 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  pub page:      u32,
  pub page_size: u32,
}

impl PageRequest {
  /// Page and size are raised to at least 1.
  pub fn new(page: u32, page_size: u32) -> Self {
    Self { page: page.max(1), page_size: page_size.max(1) }
  }

  pub fn offset(&self) -> u64 {
    u64::from(self.page - 1) * u64::from(self.page_size)
  }
}

impl Default for PageRequest {
  fn default() -> Self { Self::new(1, 10) }
}

/// Pagination metadata returned alongside a page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
  pub current_page: u32,
  pub per_page:     u32,
  pub total:        u64,
  pub total_pages:  u64,
  pub has_prev:     bool,
  pub has_next:     bool,
}

impl Pagination {
  pub fn new(request: PageRequest, total: u64) -> Self {
    let total_pages = total.div_ceil(u64::from(request.page_size));
    Self {
      current_page: request.page,
      per_page: request.page_size,
      total,
      total_pages,
      has_prev: request.page > 1,
      has_next: u64::from(request.page) < total_pages,
    }
  }
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
  pub items:      Vec<T>,
  pub pagination: Pagination,
}

impl<T> Page<T> {
  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items:      self.items.into_iter().map(f).collect(),
      pagination: self.pagination,
    }
  }
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// Counts by stored status, plus cards whose window has already closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
  pub total:           u64,
  pub pending:         u64,
  pub active:          u64,
  pub generated:       u64,
  pub suspended:       u64,
  pub expired:         u64,
  /// Cards with `valid_until < today`, whatever their stored status.
  pub expired_by_date: u64,
}

/// Result of [`CardStore::insert`].
#[derive(Debug, Clone)]
pub enum InsertOutcome {
  Inserted(IdentityCard),
  /// The holder already has an active or generated card that is still valid.
  HolderHasCurrentCard,
  /// Another card already carries the proposed number.
  CardNumberTaken,
}

/// Result of [`CardStore::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
  Updated,
  /// The patch was empty; nothing was written.
  Unchanged,
  NotFound,
  /// The patch would have made the card current while the holder already
  /// has another current card. Nothing was written.
  HolderHasCurrentCard,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an identity-card store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait CardStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// One page of cards matching `filter`, newest first (ties broken by id,
  /// descending). `total` is counted with the same predicate as the page.
  fn list<'a>(
    &'a self,
    filter: &'a CardFilter,
    page: PageRequest,
  ) -> impl Future<Output = Result<Page<StoredCard>, Self::Error>> + Send + 'a;

  /// Retrieve a card with its holder joined. Returns `None` if not found.
  fn get(
    &self,
    id: CardId,
  ) -> impl Future<Output = Result<Option<StoredCard>, Self::Error>> + Send + '_;

  /// The most recently created card for `holder_id` that is active or
  /// generated and has `valid_until >= today`.
  fn active_for_holder(
    &self,
    holder_id: HolderId,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Option<IdentityCard>, Self::Error>> + Send + '_;

  /// Whether any card other than `exclude` carries `number`.
  fn card_number_exists<'a>(
    &'a self,
    number: &'a str,
    exclude: Option<CardId>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn statistics(
    &self,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Statistics, Self::Error>> + Send + '_;

  /// All cards with exactly `status`, newest first.
  fn list_by_status(
    &self,
    status: CardStatus,
  ) -> impl Future<Output = Result<Vec<StoredCard>, Self::Error>> + Send + '_;

  /// Active cards with `from <= valid_until <= until`, soonest first.
  fn expiring(
    &self,
    from: NaiveDate,
    until: NaiveDate,
  ) -> impl Future<Output = Result<Vec<StoredCard>, Self::Error>> + Send + '_;

  /// Cards created inside `[start, end]`, newest first.
  fn created_between(
    &self,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<StoredCard>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert `card` unless the holder already has a current card (judged
  /// against `today`) or the card number is taken. The check and the write
  /// are a single atomic step.
  fn insert(
    &self,
    card: NewCard,
    today: NaiveDate,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + '_;

  /// Apply `patch` and stamp `updated_by`/`updated_at`.
  ///
  /// If the card was not current before the patch and is current after it
  /// (judged against the stamp's date), the write only happens when no other
  /// card of the same holder is current. The check and the write are a single
  /// atomic step.
  fn update(
    &self,
    id: CardId,
    patch: CardPatch,
    stamp: Stamp,
  ) -> impl Future<Output = Result<UpdateOutcome, Self::Error>> + Send + '_;

  /// Hard delete. Returns `false` if the card did not exist.
  fn delete(
    &self,
    id: CardId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Set `status` on every card in `ids` whose current status is in `from`,
  /// atomically. When `status` is active or generated, cards whose holder
  /// already has another current card (as of the stamp's date) are skipped;
  /// this includes cards made current earlier in the same batch, so at most
  /// one card per holder is let through. Returns the number of rows changed; an empty `ids` is a no-op
  /// returning 0.
  fn bulk_set_status<'a>(
    &'a self,
    ids: &'a [CardId],
    status: CardStatus,
    from: &'a [CardStatus],
    stamp: Stamp,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Hard delete every card in `ids` in one statement.
  fn bulk_delete<'a>(
    &'a self,
    ids: &'a [CardId],
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}
