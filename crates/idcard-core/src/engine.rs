//! The lifecycle engine. Every rule about creating, changing and removing
//! cards is enforced here, before the store is touched.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{Datelike, Days, NaiveDate, NaiveTime};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  card::{
    ActorId, CardDraft, CardId, CardPatch, CardStatus, CardView, ExpiringCard,
    HolderId, IdentityCard, NewCard, Stamp, StoredCard,
  },
  clock::{Clock, SystemClock},
  config::{BulkDeletePolicy, EngineConfig},
  lifecycle::{BulkAction, Validity},
  number,
  store::{
    CardFilter, CardStore, InsertOutcome, Page, PageRequest, Statistics, UpdateOutcome,
  },
};

/// What a bulk action actually did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
  pub action:    BulkAction,
  /// Distinct ids in the request.
  pub requested: u64,
  /// Rows the store changed or removed.
  pub affected:  u64,
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Run a backend call under `limit`, converting its error with `wrap`.
pub(crate) async fn bounded<T, E, F>(
  limit: Duration,
  op: &'static str,
  fut: F,
  wrap: fn(BoxError) -> Error,
) -> Result<T>
where
  F: Future<Output = Result<T, E>>,
  E: std::error::Error + Send + Sync + 'static,
{
  match tokio::time::timeout(limit, fut).await {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(e)) => {
      tracing::error!(op, error = %e, "backend call failed");
      Err(wrap(Box::new(e)))
    }
    Err(_) => {
      tracing::warn!(op, ?limit, "backend call timed out");
      Err(Error::Timeout { op, limit })
    }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Validates and applies card lifecycle operations against a [`CardStore`].
///
/// Cloning is cheap; all state is reference-counted.
pub struct LifecycleEngine<S> {
  store:  Arc<S>,
  clock:  Arc<dyn Clock>,
  config: Arc<EngineConfig>,
}

impl<S> Clone for LifecycleEngine<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      clock:  Arc::clone(&self.clock),
      config: Arc::clone(&self.config),
    }
  }
}

impl<S: CardStore> LifecycleEngine<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      store,
      clock: Arc::new(SystemClock),
      config: Arc::new(config),
    })
  }

  /// Replace the wall clock, e.g. with a [`crate::clock::FixedClock`].
  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Arc::new(clock);
    self
  }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn clock(&self) -> &dyn Clock { self.clock.as_ref() }

  pub fn today(&self) -> NaiveDate { self.clock.today() }

  async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T>
  where
    F: Future<Output = Result<T, S::Error>>,
  {
    bounded(self.config.store_timeout(), op, fut, Error::Store).await
  }

  fn stamp(&self, actor: &ActorId) -> Stamp {
    Stamp { actor: actor.clone(), at: self.clock.now() }
  }

  /// Attach today's validity classification.
  pub fn view(&self, stored: StoredCard) -> CardView {
    let validity = Validity::classify(
      stored.card.valid_from,
      stored.card.valid_until,
      self.today(),
      self.config.expiring_soon_days,
    );
    CardView { card: stored.card, holder: stored.holder, validity }
  }

  /// Build a page request from optional caller input, applying the
  /// configured default and cap.
  pub fn page_request(&self, page: Option<u32>, page_size: Option<u32>) -> PageRequest {
    let size = page_size
      .unwrap_or(self.config.default_page_size)
      .min(self.config.max_page_size);
    PageRequest::new(page.unwrap_or(1), size)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn list(&self, filter: &CardFilter, page: PageRequest) -> Result<Page<CardView>> {
    let page = self.call("list", self.store.list(filter, page)).await?;
    Ok(page.map(|stored| self.view(stored)))
  }

  pub async fn get(&self, id: CardId) -> Result<Option<CardView>> {
    let stored = self.call("get", self.store.get(id)).await?;
    Ok(stored.map(|s| self.view(s)))
  }

  /// Like [`Self::get`], but absence is an error.
  pub async fn require(&self, id: CardId) -> Result<CardView> {
    self.get(id).await?.ok_or(Error::CardNotFound(id))
  }

  pub async fn active_for_holder(&self, holder_id: HolderId) -> Result<Option<IdentityCard>> {
    self
      .call("active_for_holder", self.store.active_for_holder(holder_id, self.today()))
      .await
  }

  pub async fn statistics(&self) -> Result<Statistics> {
    self.call("statistics", self.store.statistics(self.today())).await
  }

  pub async fn list_by_status(&self, status: CardStatus) -> Result<Vec<CardView>> {
    let cards = self.call("list_by_status", self.store.list_by_status(status)).await?;
    Ok(cards.into_iter().map(|s| self.view(s)).collect())
  }

  /// Active cards whose window closes within `days` (default: the
  /// configured warning window), soonest first.
  pub async fn expiring(&self, days: Option<u32>) -> Result<Vec<ExpiringCard>> {
    let today = self.today();
    let days = days.unwrap_or(self.config.expiring_soon_days);
    let until = today
      .checked_add_days(Days::new(u64::from(days)))
      .unwrap_or(NaiveDate::MAX);

    let cards = self.call("expiring", self.store.expiring(today, until)).await?;
    Ok(
      cards
        .into_iter()
        .map(|s| {
          let days_until_expiry = (s.card.valid_until - today).num_days();
          ExpiringCard { view: self.view(s), days_until_expiry }
        })
        .collect(),
    )
  }

  /// Cards created on any day in `from..=to`.
  pub async fn created_between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<CardView>> {
    if from > to {
      return Err(Error::InvalidDateRange { from, to });
    }
    let start = from.and_time(NaiveTime::MIN).and_utc();
    let end = to
      .and_hms_micro_opt(23, 59, 59, 999_999)
      .unwrap_or_else(|| to.and_time(NaiveTime::MIN))
      .and_utc();

    let cards = self
      .call("created_between", self.store.created_between(start, end))
      .await?;
    Ok(cards.into_iter().map(|s| self.view(s)).collect())
  }

  // ── Writes ────────────────────────────────────────────────────────────

  /// Issue a new card for a holder.
  ///
  /// Fails with a conflict if the holder already has a current card, and
  /// retries card-number generation on collisions up to the configured limit.
  pub async fn create(&self, draft: CardDraft, actor: &ActorId) -> Result<CardView> {
    let holder_id = draft.holder_id.ok_or(Error::MissingField("holder_id"))?;
    let card_type = draft.card_type.ok_or(Error::MissingField("card_type"))?;
    let valid_from = draft.valid_from.ok_or(Error::MissingField("valid_from"))?;
    let valid_until = draft.valid_until.ok_or(Error::MissingField("valid_until"))?;

    if valid_from >= valid_until {
      return Err(Error::InvalidValidityWindow { from: valid_from, until: valid_until });
    }

    let status = draft.status.unwrap_or_default();
    if !matches!(status, CardStatus::Pending | CardStatus::Active) {
      return Err(Error::InvalidInitialStatus(status));
    }

    let today = self.today();
    if let Some(existing) = self.active_for_holder(holder_id).await? {
      tracing::warn!(
        %holder_id,
        existing = %existing.id,
        "holder already has an active identity card"
      );
      return Err(Error::ActiveCardExists(holder_id));
    }

    let notes = draft.notes.filter(|n| !n.trim().is_empty());
    let attempts = self.config.card_number_attempts;

    for attempt in 1..=attempts {
      let card_number =
        number::generate(&self.config.card_number_prefix, today.year(), &mut OsRng);

      if self
        .call("card_number_exists", self.store.card_number_exists(&card_number, None))
        .await?
      {
        tracing::warn!(%card_number, attempt, "card number collision");
        continue;
      }

      let new_card = NewCard {
        holder_id,
        card_type,
        card_number: card_number.clone(),
        valid_from,
        valid_until,
        status,
        notes: notes.clone(),
        created_by: actor.clone(),
      };

      match self.call("insert", self.store.insert(new_card, today)).await? {
        InsertOutcome::Inserted(card) => {
          tracing::info!(
            card_id = %card.id,
            %card_number,
            %holder_id,
            %actor,
            "identity card created"
          );
          let stored = self
            .call("get", self.store.get(card.id))
            .await?
            .unwrap_or(StoredCard { card, holder: None });
          return Ok(self.view(stored));
        }
        InsertOutcome::HolderHasCurrentCard => {
          tracing::warn!(%holder_id, "concurrent active card detected on insert");
          return Err(Error::ActiveCardExists(holder_id));
        }
        InsertOutcome::CardNumberTaken => {
          tracing::warn!(%card_number, attempt, "card number taken on insert");
        }
      }
    }

    tracing::warn!(attempts, "card number allocation exhausted");
    Err(Error::CardNumberExhausted(attempts))
  }

  /// Apply a partial update after validating it against the merged state.
  pub async fn update(&self, id: CardId, patch: CardPatch, actor: &ActorId) -> Result<CardView> {
    if patch.is_empty() {
      return Err(Error::EmptyPatch);
    }

    let existing = self
      .call("get", self.store.get(id))
      .await?
      .ok_or(Error::CardNotFound(id))?
      .card;
    let merged = patch.merged_onto(&existing);

    if (patch.valid_from.is_some() || patch.valid_until.is_some())
      && merged.valid_from >= merged.valid_until
    {
      return Err(Error::InvalidValidityWindow {
        from:  merged.valid_from,
        until: merged.valid_until,
      });
    }

    let mut patch = patch;
    if let Some(to) = patch.status {
      let from = existing.status;
      if !from.can_transition_to(to) {
        return Err(Error::IllegalTransition { from, to });
      }
      if to == CardStatus::Generated
        && from != CardStatus::Generated
        && !matches!(patch.artifact_path, Some(Some(_)))
      {
        return Err(Error::MissingArtifact);
      }
      if from == CardStatus::Expired && to == CardStatus::Active {
        if patch.valid_until.is_none() || merged.valid_until < self.today() {
          return Err(Error::RenewalWithoutNewExpiry);
        }
        patch = patch.clearing_artifact();
      }
    }

    // Reviving a card by status or by date must not give its holder a
    // second current card.
    let today = self.today();
    let is_current = |c: &IdentityCard| c.status.is_current() && c.valid_until >= today;
    if is_current(&merged) && !is_current(&existing) {
      self.ensure_no_other_active(&merged).await?;
    }

    match self
      .call("update", self.store.update(id, patch, self.stamp(actor)))
      .await?
    {
      UpdateOutcome::Updated | UpdateOutcome::Unchanged => {}
      UpdateOutcome::NotFound => return Err(Error::CardNotFound(id)),
      UpdateOutcome::HolderHasCurrentCard => {
        tracing::warn!(
          card_id = %id,
          holder_id = %existing.holder_id,
          "concurrent current card detected on update"
        );
        return Err(Error::ActiveCardExists(existing.holder_id));
      }
    }

    tracing::info!(card_id = %id, %actor, "identity card updated");
    self.require(id).await
  }

  async fn ensure_no_other_active(&self, card: &IdentityCard) -> Result<()> {
    match self.active_for_holder(card.holder_id).await? {
      Some(other) if other.id != card.id => {
        tracing::warn!(
          holder_id = %card.holder_id,
          existing = %other.id,
          "refusing to activate a second card"
        );
        Err(Error::ActiveCardExists(card.holder_id))
      }
      _ => Ok(()),
    }
  }

  /// Permanently remove a card.
  pub async fn delete(&self, id: CardId, actor: &ActorId) -> Result<()> {
    if !self.call("delete", self.store.delete(id)).await? {
      return Err(Error::CardNotFound(id));
    }
    tracing::info!(card_id = %id, %actor, "identity card deleted");
    Ok(())
  }

  /// Apply `action` to every card in `ids` as one batched store call.
  ///
  /// Cards whose current status cannot legally move to the target are left
  /// untouched, as are cards whose holder already has another current card
  /// when activating; `affected` reports what actually changed.
  pub async fn bulk(
    &self,
    action: BulkAction,
    ids: &[CardId],
    actor: &ActorId,
  ) -> Result<BulkOutcome> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
      return Err(Error::EmptySelection);
    }

    let affected = match action.target() {
      Some(status) => {
        let sources = status.bulk_sources();
        self
          .call(
            "bulk_set_status",
            self.store.bulk_set_status(&ids, status, &sources, self.stamp(actor)),
          )
          .await?
      }
      None => match self.config.bulk_delete {
        BulkDeletePolicy::Disabled => return Err(Error::BulkDeleteDisabled),
        BulkDeletePolicy::HardDelete => {
          self.call("bulk_delete", self.store.bulk_delete(&ids)).await?
        }
      },
    };

    let outcome = BulkOutcome { action, requested: ids.len() as u64, affected };
    tracing::info!(
      ?action,
      requested = outcome.requested,
      affected,
      %actor,
      "bulk action applied"
    );
    Ok(outcome)
  }
}
