//! Integration tests for `SqliteStore`, and for the lifecycle engine and
//! generation workflow running on top of it, against an in-memory database.

use std::{
  collections::{HashMap, HashSet},
  convert::Infallible,
  sync::{Arc, Mutex},
};

use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use idcard_core::{
  Error as CoreError,
  card::{ActorId, CardDraft, CardPatch, CardStatus, CardType, HolderId, NewCard, Stamp},
  clock::FixedClock,
  config::{BulkDeletePolicy, EngineConfig},
  engine::LifecycleEngine,
  generate::GenerationWorkflow,
  holder::{Holder, HolderDirectory},
  lifecycle::BulkAction,
  render::{Artifact, ArtifactHandle, ArtifactRenderer, RenderRequest},
  store::{CardFilter, CardStore, InsertOutcome, PageRequest, UpdateOutcome},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

fn d(y: i32, m: u32, day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, day).unwrap() }

fn today() -> NaiveDate { d(2025, 6, 1) }

fn admin() -> ActorId { ActorId::new("admin") }

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

fn engine_with(store: &Arc<SqliteStore>, config: EngineConfig) -> LifecycleEngine<SqliteStore> {
  LifecycleEngine::new(Arc::clone(store), config)
    .unwrap()
    .with_clock(FixedClock::on(today()))
}

fn engine(store: &Arc<SqliteStore>) -> LifecycleEngine<SqliteStore> {
  engine_with(store, EngineConfig::default())
}

async fn holder(s: &SqliteStore, external_id: &str, name: &str) -> HolderId {
  let holder = Holder {
    holder_id:       Uuid::new_v4(),
    external_id:     external_id.into(),
    name:            name.into(),
    email:           None,
    phone:           None,
    photo:           None,
    class_name:      Some("CS-1".into()),
    department_name: None,
  };
  s.insert_holder(&holder).await.unwrap();
  holder.holder_id
}

fn draft(holder_id: HolderId, status: CardStatus) -> CardDraft {
  CardDraft {
    holder_id:   Some(holder_id),
    card_type:   Some(CardType::Student),
    valid_from:  Some(d(2025, 1, 1)),
    valid_until: Some(d(2025, 12, 31)),
    status:      Some(status),
    notes:       None,
  }
}

fn new_card(holder_id: HolderId, number: &str, status: CardStatus) -> NewCard {
  NewCard {
    holder_id,
    card_type: CardType::Staff,
    card_number: number.into(),
    valid_from: d(2025, 1, 1),
    valid_until: d(2025, 12, 31),
    status,
    notes: None,
    created_by: admin(),
  }
}

// ─── Renderer fake ───────────────────────────────────────────────────────────

/// Keeps rendered artifacts in memory, keyed by path.
#[derive(Default)]
struct MemoryRenderer {
  files: Mutex<HashMap<String, Bytes>>,
}

impl ArtifactRenderer for MemoryRenderer {
  type Error = Infallible;

  async fn render(&self, request: &RenderRequest) -> Result<ArtifactHandle, Infallible> {
    let path = format!("identity_card_{}_0000.pdf", request.card_number);
    let bytes = Bytes::from(format!("%PDF {} {}", request.card_number, request.holder_name));
    self.files.lock().unwrap().insert(path.clone(), bytes);
    Ok(ArtifactHandle {
      path,
      content_hash: "0000".into(),
      media_type: "application/pdf".into(),
    })
  }

  async fn fetch(&self, path: &str) -> Result<Option<Artifact>, Infallible> {
    Ok(self.files.lock().unwrap().get(path).map(|bytes| Artifact {
      media_type: "application/pdf".into(),
      bytes:      bytes.clone(),
    }))
  }
}

fn workflow(
  store: &Arc<SqliteStore>,
) -> GenerationWorkflow<SqliteStore, SqliteStore, MemoryRenderer> {
  GenerationWorkflow::new(engine(store), Arc::clone(store), Arc::new(MemoryRenderer::default()))
}

// ─── Store: inserts ──────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_joins_holder() {
  let s = store().await;
  let h = holder(&s, "S-001", "Ada Lovelace").await;

  let outcome = s.insert(new_card(h, "ID20250001", CardStatus::Pending), today()).await.unwrap();
  let InsertOutcome::Inserted(card) = outcome else { panic!("expected insert") };

  let stored = s.get(card.id).await.unwrap().unwrap();
  assert_eq!(stored.card, card);
  assert_eq!(stored.holder.unwrap().name, "Ada Lovelace");
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn dangling_holder_reads_as_none() {
  let s = store().await;
  let outcome = s
    .insert(new_card(Uuid::new_v4(), "ID20250001", CardStatus::Pending), today())
    .await
    .unwrap();
  let InsertOutcome::Inserted(card) = outcome else { panic!("expected insert") };
  assert!(s.get(card.id).await.unwrap().unwrap().holder.is_none());
}

#[tokio::test]
async fn duplicate_number_is_reported_not_raised() {
  let s = store().await;
  let a = holder(&s, "S-001", "Ada").await;
  let b = holder(&s, "S-002", "Grace").await;

  s.insert(new_card(a, "ID20250001", CardStatus::Pending), today()).await.unwrap();
  let outcome = s.insert(new_card(b, "ID20250001", CardStatus::Pending), today()).await.unwrap();
  assert!(matches!(outcome, InsertOutcome::CardNumberTaken));
  assert_eq!(s.statistics(today()).await.unwrap().total, 1);
}

#[tokio::test]
async fn second_current_card_is_refused_atomically() {
  let s = store().await;
  let h = holder(&s, "S-001", "Ada").await;

  s.insert(new_card(h, "ID20250001", CardStatus::Active), today()).await.unwrap();
  let outcome = s.insert(new_card(h, "ID20250002", CardStatus::Active), today()).await.unwrap();
  assert!(matches!(outcome, InsertOutcome::HolderHasCurrentCard));

  // Once the first card's window has closed it no longer counts.
  let next_year = d(2026, 1, 15);
  let mut renewal = new_card(h, "ID20260001", CardStatus::Active);
  renewal.valid_from = d(2026, 1, 1);
  renewal.valid_until = d(2026, 12, 31);
  let outcome = s.insert(renewal, next_year).await.unwrap();
  assert!(matches!(outcome, InsertOutcome::Inserted(_)));
}

#[tokio::test]
async fn card_number_exists_honours_exclusion() {
  let s = store().await;
  let h = holder(&s, "S-001", "Ada").await;
  let InsertOutcome::Inserted(card) =
    s.insert(new_card(h, "ID20250001", CardStatus::Pending), today()).await.unwrap()
  else {
    panic!("expected insert")
  };

  assert!(s.card_number_exists("ID20250001", None).await.unwrap());
  assert!(!s.card_number_exists("ID20250001", Some(card.id)).await.unwrap());
  assert!(!s.card_number_exists("ID20259999", None).await.unwrap());
}

#[tokio::test]
async fn duplicate_holder_is_rejected() {
  let s = store().await;
  holder(&s, "S-001", "Ada").await;
  let again = Holder {
    holder_id:       Uuid::new_v4(),
    external_id:     "S-001".into(),
    name:            "Someone Else".into(),
    email:           None,
    phone:           None,
    photo:           None,
    class_name:      None,
    department_name: None,
  };
  assert!(matches!(s.insert_holder(&again).await, Err(Error::DuplicateHolder(id)) if id == "S-001"));
}

#[tokio::test]
async fn holder_directory_lookup() {
  let s = store().await;
  let h = holder(&s, "S-001", "Ada").await;
  assert_eq!(s.get_holder(h).await.unwrap().unwrap().external_id, "S-001");
  assert!(s.get_holder(Uuid::new_v4()).await.unwrap().is_none());
}

// ─── Engine: create ──────────────────────────────────────────────────────────

#[tokio::test]
async fn create_assigns_prefixed_number_and_audit() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  let view = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();
  assert!(view.card.card_number.starts_with("ID2025"));
  assert_eq!(view.card.card_number.len(), 10);
  assert_eq!(view.card.status, CardStatus::Pending);
  assert_eq!(view.card.created_by, admin());
  assert_eq!(view.holder.unwrap().external_id, "S-001");
  assert!(!view.validity.is_expired);
}

#[tokio::test]
async fn create_validates_input() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  let mut missing = draft(h, CardStatus::Pending);
  missing.card_type = None;
  assert!(matches!(
    e.create(missing, &admin()).await,
    Err(CoreError::MissingField("card_type"))
  ));

  let mut inverted = draft(h, CardStatus::Pending);
  inverted.valid_from = Some(d(2026, 1, 1));
  assert!(matches!(
    e.create(inverted, &admin()).await,
    Err(CoreError::InvalidValidityWindow { .. })
  ));

  assert!(matches!(
    e.create(draft(h, CardStatus::Generated), &admin()).await,
    Err(CoreError::InvalidInitialStatus(CardStatus::Generated))
  ));
  assert_eq!(e.statistics().await.unwrap().total, 0);
}

#[tokio::test]
async fn card_numbers_are_unique_across_many_creates() {
  let s = store().await;
  let e = engine(&s);

  let mut numbers = HashSet::new();
  for i in 0..50 {
    let h = holder(&s, &format!("S-{i:03}"), "Student").await;
    let view = e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();
    numbers.insert(view.card.card_number);
  }
  assert_eq!(numbers.len(), 50);
}

#[tokio::test]
async fn second_active_card_conflicts_and_leaves_count_unchanged() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();
  let err = e.create(draft(h, CardStatus::Active), &admin()).await.unwrap_err();
  assert!(matches!(err, CoreError::ActiveCardExists(id) if id == h));
  assert_eq!(e.statistics().await.unwrap().total, 1);

  // Any new card is refused while the current one is valid.
  assert!(matches!(
    e.create(draft(h, CardStatus::Pending), &admin()).await,
    Err(CoreError::ActiveCardExists(_))
  ));
}

#[tokio::test]
async fn concurrent_creates_for_one_holder_admit_exactly_one() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  let admin = admin();
  let (a, b) = tokio::join!(
    e.create(draft(h, CardStatus::Active), &admin),
    e.create(draft(h, CardStatus::Active), &admin),
  );
  let ok = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
  assert_eq!(ok, 1);
  assert_eq!(e.statistics().await.unwrap().total, 1);
}

// ─── Engine: reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn pages_are_disjoint_and_cover_everything() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  for _ in 0..25 {
    e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();
  }

  let mut seen = HashSet::new();
  let mut sizes = Vec::new();
  for page in 1..=3 {
    let result = e.list(&CardFilter::new(), PageRequest::new(page, 10)).await.unwrap();
    assert_eq!(result.pagination.total, 25);
    assert_eq!(result.pagination.total_pages, 3);
    sizes.push(result.items.len());
    for item in result.items {
      assert!(seen.insert(item.card.id));
    }
  }
  assert_eq!(sizes, [10, 10, 5]);
  assert_eq!(seen.len(), 25);

  let beyond = e.list(&CardFilter::new(), PageRequest::new(4, 10)).await.unwrap();
  assert!(beyond.items.is_empty());
  assert!(!beyond.pagination.has_next);
}

#[tokio::test]
async fn list_is_newest_first() {
  let s = store().await;
  let e = engine(&s);
  let a = holder(&s, "S-001", "Ada").await;
  let b = holder(&s, "S-002", "Grace").await;

  let first = e.create(draft(a, CardStatus::Pending), &admin()).await.unwrap();
  let second = e.create(draft(b, CardStatus::Pending), &admin()).await.unwrap();

  let page = e.list(&CardFilter::new(), PageRequest::default()).await.unwrap();
  assert_eq!(page.items[0].card.id, second.card.id);
  assert_eq!(page.items[1].card.id, first.card.id);
}

#[tokio::test]
async fn search_matches_number_and_holder_fields() {
  let s = store().await;
  let e = engine(&s);
  let ada = holder(&s, "S-001", "Ada Lovelace").await;
  let grace = holder(&s, "T-777", "Grace Hopper").await;

  let ada_card = e.create(draft(ada, CardStatus::Pending), &admin()).await.unwrap();
  e.create(draft(grace, CardStatus::Active), &admin()).await.unwrap();

  let by_name = e.list(&CardFilter::new().search("lovelace"), PageRequest::default()).await.unwrap();
  assert_eq!(by_name.pagination.total, 1);
  assert_eq!(by_name.items[0].card.id, ada_card.card.id);

  let by_external = e.list(&CardFilter::new().search("t-77"), PageRequest::default()).await.unwrap();
  assert_eq!(by_external.pagination.total, 1);

  let number = ada_card.card.card_number.clone();
  let by_number = e.list(&CardFilter::new().search(&number), PageRequest::default()).await.unwrap();
  assert_eq!(by_number.items[0].card.card_number, number);

  let combined = e
    .list(&CardFilter::new().search("a").status(CardStatus::Active), PageRequest::default())
    .await
    .unwrap();
  assert_eq!(combined.pagination.total, 1);
  assert_eq!(combined.items[0].card.status, CardStatus::Active);

  let wildcard = e.list(&CardFilter::new().search("%"), PageRequest::default()).await.unwrap();
  assert_eq!(wildcard.pagination.total, 0);
}

#[tokio::test]
async fn filter_by_card_type() {
  let s = store().await;
  let e = engine(&s);
  let a = holder(&s, "S-001", "Ada").await;
  let b = holder(&s, "S-002", "Grace").await;

  e.create(draft(a, CardStatus::Pending), &admin()).await.unwrap();
  let mut staff = draft(b, CardStatus::Pending);
  staff.card_type = Some(CardType::Staff);
  e.create(staff, &admin()).await.unwrap();

  let page = e
    .list(&CardFilter::new().card_type(CardType::Staff), PageRequest::default())
    .await
    .unwrap();
  assert_eq!(page.pagination.total, 1);
  assert_eq!(page.items[0].card.card_type, CardType::Staff);
}

#[tokio::test]
async fn validity_boundary_is_inclusive_of_last_day() {
  let s = store().await;
  let h = holder(&s, "S-001", "Ada").await;
  let mut d1 = draft(h, CardStatus::Active);
  d1.valid_from = Some(d(2025, 1, 1));
  d1.valid_until = Some(today());

  let on_last_day = engine(&s).create(d1, &admin()).await.unwrap();
  assert!(!on_last_day.validity.is_expired);
  assert_eq!(on_last_day.validity.days_remaining, 0);

  let day_after = LifecycleEngine::new(Arc::clone(&s), EngineConfig::default())
    .unwrap()
    .with_clock(FixedClock::on(d(2025, 6, 2)));
  let view = day_after.require(on_last_day.card.id).await.unwrap();
  assert!(view.validity.is_expired);
  // The stored status is untouched by the date.
  assert_eq!(view.card.status, CardStatus::Active);
  assert!(day_after.active_for_holder(h).await.unwrap().is_none());
}

#[tokio::test]
async fn expiring_soon_lists_active_cards_in_window() {
  let s = store().await;
  let e = engine(&s);
  let soon = holder(&s, "S-001", "Ada").await;
  let later = holder(&s, "S-002", "Grace").await;

  let mut near = draft(soon, CardStatus::Active);
  near.valid_until = Some(d(2025, 6, 15));
  let near = e.create(near, &admin()).await.unwrap();
  assert!(near.validity.is_expiring_soon);
  assert_eq!(near.validity.days_remaining, 14);

  e.create(draft(later, CardStatus::Active), &admin()).await.unwrap();

  let expiring = e.expiring(None).await.unwrap();
  assert_eq!(expiring.len(), 1);
  assert_eq!(expiring[0].view.card.id, near.card.id);
  assert_eq!(expiring[0].days_until_expiry, 14);

  assert!(e.expiring(Some(7)).await.unwrap().is_empty());
  assert_eq!(e.expiring(Some(365)).await.unwrap().len(), 2);
}

#[tokio::test]
async fn statistics_count_statuses_and_closed_windows() {
  let s = store().await;
  let e = engine(&s);
  let a = holder(&s, "S-001", "Ada").await;
  let b = holder(&s, "S-002", "Grace").await;
  let c = holder(&s, "S-003", "Edsger").await;

  e.create(draft(a, CardStatus::Pending), &admin()).await.unwrap();
  e.create(draft(b, CardStatus::Active), &admin()).await.unwrap();
  let mut old = draft(c, CardStatus::Active);
  old.valid_from = Some(d(2024, 1, 1));
  old.valid_until = Some(d(2024, 12, 31));
  e.create(old, &admin()).await.unwrap();

  let stats = e.statistics().await.unwrap();
  assert_eq!(stats.total, 3);
  assert_eq!(stats.pending, 1);
  assert_eq!(stats.active, 2);
  assert_eq!(stats.generated, 0);
  assert_eq!(stats.expired, 0);
  assert_eq!(stats.expired_by_date, 1);
}

#[tokio::test]
async fn list_by_status_and_created_between() {
  let s = store().await;
  let e = engine(&s);
  let a = holder(&s, "S-001", "Ada").await;
  let b = holder(&s, "S-002", "Grace").await;

  e.create(draft(a, CardStatus::Pending), &admin()).await.unwrap();
  e.create(draft(b, CardStatus::Active), &admin()).await.unwrap();

  let active = e.list_by_status(CardStatus::Active).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].card.holder_id, b);

  let now = Utc::now().date_naive();
  let created = e.created_between(now.pred_opt().unwrap(), now).await.unwrap();
  assert_eq!(created.len(), 2);
  assert!(e.created_between(d(2000, 1, 1), d(2000, 1, 2)).await.unwrap().is_empty());
  assert!(matches!(
    e.created_between(now, now.pred_opt().unwrap()).await,
    Err(CoreError::InvalidDateRange { .. })
  ));
}

// ─── Engine: update / delete ─────────────────────────────────────────────────

#[tokio::test]
async fn empty_patch_is_rejected_without_touching_the_row() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();

  let err = e.update(card.card.id, CardPatch::default(), &admin()).await.unwrap_err();
  assert!(matches!(err, CoreError::EmptyPatch));
  assert!(e.require(card.card.id).await.unwrap().card.updated_at.is_none());
}

#[tokio::test]
async fn update_stamps_actor_and_time() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();

  let patch = CardPatch { notes: Some(Some("replacement".into())), ..Default::default() };
  let updated = e.update(card.card.id, patch, &ActorId::new("clerk")).await.unwrap();
  assert_eq!(updated.card.notes.as_deref(), Some("replacement"));
  assert_eq!(updated.card.updated_by, Some(ActorId::new("clerk")));
  assert_eq!(updated.card.updated_at, Some(e.clock().now()));
  assert_eq!(updated.card.card_number, card.card.card_number);
}

#[tokio::test]
async fn update_rejects_inverted_window_and_illegal_transition() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();
  let id = card.card.id;

  let inverted = CardPatch { valid_until: Some(d(2024, 12, 31)), ..Default::default() };
  assert!(matches!(
    e.update(id, inverted, &admin()).await,
    Err(CoreError::InvalidValidityWindow { .. })
  ));

  let illegal = CardPatch { status: Some(CardStatus::Expired), ..Default::default() };
  assert!(matches!(
    e.update(id, illegal, &admin()).await,
    Err(CoreError::IllegalTransition { from: CardStatus::Pending, to: CardStatus::Expired })
  ));

  let unchanged = e.require(id).await.unwrap();
  assert_eq!(unchanged.card.status, CardStatus::Pending);
  assert_eq!(unchanged.card.valid_until, d(2025, 12, 31));
}

#[tokio::test]
async fn generated_requires_an_artifact_on_update() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();

  let patch = CardPatch { status: Some(CardStatus::Generated), ..Default::default() };
  assert!(matches!(
    e.update(card.card.id, patch, &admin()).await,
    Err(CoreError::MissingArtifact)
  ));
}

#[tokio::test]
async fn activating_second_card_conflicts() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  let spare = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();
  e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();

  let patch = CardPatch { status: Some(CardStatus::Active), ..Default::default() };
  assert!(matches!(
    e.update(spare.card.id, patch, &admin()).await,
    Err(CoreError::ActiveCardExists(_))
  ));
}

#[tokio::test]
async fn renewing_expired_card_requires_new_expiry() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();
  let id = card.card.id;

  let expire = CardPatch { status: Some(CardStatus::Expired), ..Default::default() };
  e.update(id, expire, &admin()).await.unwrap();

  let bare = CardPatch { status: Some(CardStatus::Active), ..Default::default() };
  assert!(matches!(
    e.update(id, bare, &admin()).await,
    Err(CoreError::RenewalWithoutNewExpiry)
  ));

  let renew = CardPatch {
    status: Some(CardStatus::Active),
    valid_until: Some(d(2026, 12, 31)),
    ..Default::default()
  };
  let renewed = e.update(id, renew, &admin()).await.unwrap();
  assert_eq!(renewed.card.status, CardStatus::Active);
  assert_eq!(renewed.card.valid_until, d(2026, 12, 31));
  assert!(renewed.card.artifact_path.is_none());
}

#[tokio::test]
async fn delete_removes_and_reports_missing() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();

  e.delete(card.card.id, &admin()).await.unwrap();
  assert!(e.get(card.card.id).await.unwrap().is_none());
  assert!(matches!(
    e.delete(card.card.id, &admin()).await,
    Err(CoreError::CardNotFound(_))
  ));
}

// ─── Engine: bulk ────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_deactivate_skips_illegal_sources() {
  let s = store().await;
  let e = engine(&s);
  let a = holder(&s, "S-001", "Ada").await;
  let b = holder(&s, "S-002", "Grace").await;
  let c = holder(&s, "S-003", "Edsger").await;

  let one = e.create(draft(a, CardStatus::Active), &admin()).await.unwrap();
  let two = e.create(draft(b, CardStatus::Pending), &admin()).await.unwrap();
  let three = e.create(draft(c, CardStatus::Active), &admin()).await.unwrap();
  let expire = CardPatch { status: Some(CardStatus::Expired), ..Default::default() };
  e.update(three.card.id, expire, &admin()).await.unwrap();

  let ids = [one.card.id, two.card.id, three.card.id, one.card.id];
  let outcome = e.bulk(BulkAction::Deactivate, &ids, &admin()).await.unwrap();
  assert_eq!(outcome.requested, 3);
  assert_eq!(outcome.affected, 2);

  let suspended = e.list_by_status(CardStatus::Suspended).await.unwrap();
  assert_eq!(suspended.len(), 2);
  assert!(suspended.iter().all(|v| v.card.updated_by == Some(admin())));
  assert_eq!(e.require(three.card.id).await.unwrap().card.status, CardStatus::Expired);
}

#[tokio::test]
async fn bulk_activate_respects_one_current_card() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let other = holder(&s, "S-002", "Grace").await;

  let spare = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();
  e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();
  let free = e.create(draft(other, CardStatus::Pending), &admin()).await.unwrap();

  let outcome = e
    .bulk(BulkAction::Activate, &[spare.card.id, free.card.id], &admin())
    .await
    .unwrap();
  assert_eq!(outcome.affected, 1);
  assert_eq!(e.require(spare.card.id).await.unwrap().card.status, CardStatus::Pending);
  assert_eq!(e.require(free.card.id).await.unwrap().card.status, CardStatus::Active);
}

#[tokio::test]
async fn bulk_activate_lets_one_card_per_holder_through() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  let first = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();
  let second = e.create(draft(h, CardStatus::Pending), &admin()).await.unwrap();

  let outcome = e
    .bulk(BulkAction::Activate, &[first.card.id, second.card.id], &admin())
    .await
    .unwrap();
  assert_eq!(outcome.requested, 2);
  assert_eq!(outcome.affected, 1);

  let active = s.list_by_status(CardStatus::Active).await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(s.list_by_status(CardStatus::Pending).await.unwrap().len(), 1);
  assert_eq!(e.active_for_holder(h).await.unwrap().unwrap().id, active[0].card.id);
}

#[tokio::test]
async fn extending_a_lapsed_card_respects_one_current_card() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;

  let lapsed = CardDraft { valid_until: Some(d(2025, 5, 1)), ..draft(h, CardStatus::Active) };
  let old = e.create(lapsed, &admin()).await.unwrap();
  let new = e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();

  let extend = CardPatch { valid_until: Some(d(2025, 12, 31)), ..Default::default() };
  assert!(matches!(
    e.update(old.card.id, extend.clone(), &admin()).await,
    Err(CoreError::ActiveCardExists(id)) if id == h
  ));
  assert_eq!(e.require(old.card.id).await.unwrap().card.valid_until, d(2025, 5, 1));

  e.delete(new.card.id, &admin()).await.unwrap();
  let extended = e.update(old.card.id, extend, &admin()).await.unwrap();
  assert_eq!(extended.card.valid_until, d(2025, 12, 31));
}

#[tokio::test]
async fn editing_a_current_card_skips_the_holder_check() {
  let s = store().await;
  let e = engine(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = e.create(draft(h, CardStatus::Active), &admin()).await.unwrap();

  let later = CardPatch { valid_until: Some(d(2026, 6, 30)), ..Default::default() };
  let updated = e.update(card.card.id, later, &admin()).await.unwrap();
  assert_eq!(updated.card.valid_until, d(2026, 6, 30));
}

// ─── Store: guarded updates ──────────────────────────────────────────────────

fn stamp() -> Stamp {
  Stamp { actor: admin(), at: today().and_hms_opt(9, 0, 0).unwrap().and_utc() }
}

#[tokio::test]
async fn store_update_refuses_second_current_card() {
  let s = store().await;
  let h = holder(&s, "S-001", "Ada").await;

  let InsertOutcome::Inserted(spare) =
    s.insert(new_card(h, "ID20250001", CardStatus::Pending), today()).await.unwrap()
  else {
    panic!("expected insert")
  };
  let InsertOutcome::Inserted(_current) =
    s.insert(new_card(h, "ID20250002", CardStatus::Active), today()).await.unwrap()
  else {
    panic!("expected insert")
  };

  let activate = CardPatch { status: Some(CardStatus::Active), ..Default::default() };
  assert_eq!(
    s.update(spare.id, activate, stamp()).await.unwrap(),
    UpdateOutcome::HolderHasCurrentCard
  );
  let stored = s.get(spare.id).await.unwrap().unwrap().card;
  assert_eq!(stored.status, CardStatus::Pending);
  assert!(stored.updated_at.is_none());

  let note = CardPatch { notes: Some(Some("replacement".into())), ..Default::default() };
  assert_eq!(s.update(spare.id, note, stamp()).await.unwrap(), UpdateOutcome::Updated);
}

#[tokio::test]
async fn store_update_reports_missing_and_empty() {
  let s = store().await;
  let note = CardPatch { notes: Some(None), ..Default::default() };
  assert_eq!(s.update(Uuid::new_v4(), note, stamp()).await.unwrap(), UpdateOutcome::NotFound);
  assert_eq!(
    s.update(Uuid::new_v4(), CardPatch::default(), stamp()).await.unwrap(),
    UpdateOutcome::Unchanged
  );
}

#[tokio::test]
async fn bulk_rejects_empty_selection() {
  let s = store().await;
  assert!(matches!(
    engine(&s).bulk(BulkAction::Activate, &[], &admin()).await,
    Err(CoreError::EmptySelection)
  ));
}

#[tokio::test]
async fn bulk_delete_follows_policy() {
  let s = store().await;
  let h = holder(&s, "S-001", "Ada").await;
  let card = engine(&s).create(draft(h, CardStatus::Pending), &admin()).await.unwrap();
  let ids = [card.card.id, Uuid::new_v4()];

  assert!(matches!(
    engine(&s).bulk(BulkAction::Delete, &ids, &admin()).await,
    Err(CoreError::BulkDeleteDisabled)
  ));

  let config = EngineConfig { bulk_delete: BulkDeletePolicy::HardDelete, ..Default::default() };
  let outcome = engine_with(&s, config).bulk(BulkAction::Delete, &ids, &admin()).await.unwrap();
  assert_eq!(outcome.requested, 2);
  assert_eq!(outcome.affected, 1);
  assert_eq!(s.statistics(today()).await.unwrap().total, 0);
}

// ─── Generation workflow ─────────────────────────────────────────────────────

#[tokio::test]
async fn generate_then_download() {
  let s = store().await;
  let w = workflow(&s);
  let h = holder(&s, "S-001", "Ada Lovelace").await;
  let card = w.engine().create(draft(h, CardStatus::Active), &admin()).await.unwrap();

  let receipt = w.generate(card.card.id, &ActorId::new("printer")).await.unwrap();
  assert_eq!(receipt.card.card.status, CardStatus::Generated);
  assert_eq!(receipt.card.card.artifact_path.as_deref(), Some(receipt.artifact.path.as_str()));
  assert_eq!(receipt.card.card.generated_by, Some(ActorId::new("printer")));
  assert!(receipt.card.card.generated_at.is_some());

  let download = w.download(card.card.id).await.unwrap();
  assert_eq!(download.file_name, format!("identity_card_{}.pdf", card.card.card_number));
  assert_eq!(download.artifact.media_type, "application/pdf");
  assert!(download.artifact.bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn download_of_ungenerated_card_is_not_found() {
  let s = store().await;
  let w = workflow(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = w.engine().create(draft(h, CardStatus::Pending), &admin()).await.unwrap();

  assert!(matches!(w.download(card.card.id).await, Err(CoreError::ArtifactNotFound(_))));
  assert!(matches!(w.download(Uuid::new_v4()).await, Err(CoreError::ArtifactNotFound(_))));
}

#[tokio::test]
async fn suspended_card_is_not_downloadable_and_cannot_be_generated() {
  let s = store().await;
  let w = workflow(&s);
  let h = holder(&s, "S-001", "Ada").await;
  let card = w.engine().create(draft(h, CardStatus::Active), &admin()).await.unwrap();
  let id = card.card.id;

  w.generate(id, &admin()).await.unwrap();
  let suspend = CardPatch { status: Some(CardStatus::Suspended), ..Default::default() };
  w.engine().update(id, suspend, &admin()).await.unwrap();

  assert!(matches!(w.download(id).await, Err(CoreError::ArtifactNotFound(_))));
  assert!(matches!(
    w.generate(id, &admin()).await,
    Err(CoreError::IllegalTransition { from: CardStatus::Suspended, .. })
  ));
}

#[tokio::test]
async fn generate_requires_a_known_holder() {
  let s = store().await;
  let w = workflow(&s);
  let card = w
    .engine()
    .create(draft(Uuid::new_v4(), CardStatus::Pending), &admin())
    .await
    .unwrap();

  assert!(matches!(
    w.generate(card.card.id, &admin()).await,
    Err(CoreError::HolderNotFound(_))
  ));
  assert_eq!(w.engine().require(card.card.id).await.unwrap().card.status, CardStatus::Pending);
}
