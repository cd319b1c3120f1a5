//! Handlers for `/identity-cards` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/identity-cards` | `?page&limit&search&status&card_type` |
//! | `POST`   | `/identity-cards` | Body: [`CreateBody`]; returns 201 |
//! | `GET`    | `/identity-cards/statistics` | Counts by status |
//! | `GET`    | `/identity-cards/expiring` | `?days=N`; active cards closing soon |
//! | `GET`    | `/identity-cards/created` | `?from=YYYY-MM-DD&to=YYYY-MM-DD` |
//! | `POST`   | `/identity-cards/bulk` | Body: `{"action":"activate","card_ids":[...]}` |
//! | `GET`    | `/identity-cards/{id}` | 404 if not found |
//! | `PUT`    | `/identity-cards/{id}` | Body: [`UpdateBody`] |
//! | `DELETE` | `/identity-cards/{id}` | |
//! | `POST`   | `/identity-cards/{id}/generate` | Returns a `download_url` |
//! | `GET`    | `/identity-cards/{id}/download` | Artifact bytes; 404 unless generated |
//!
//! Every mutating request must carry an `X-Actor-Id` header.

use std::str::FromStr;

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::{StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use idcard_core::{
  Error,
  card::{CardDraft, CardPatch, CardStatus, CardType, CardView, ExpiringCard},
  engine::BulkOutcome,
  generate::GenerationReceipt,
  holder::HolderDirectory,
  lifecycle::BulkAction,
  render::ArtifactRenderer,
  store::{CardFilter, CardStore, Pagination, Statistics},
};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{AppState, actor::Actor, error::ApiError};

// ─── Envelope ─────────────────────────────────────────────────────────────────

/// Success body shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub success:    bool,
  pub data:       T,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pagination: Option<Pagination>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message:    Option<&'static str>,
}

impl<T> Envelope<T> {
  fn ok(data: T) -> Json<Self> {
    Json(Self { success: true, data, pagination: None, message: None })
  }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

// ─── Input parsing ────────────────────────────────────────────────────────────

/// Treat empty query/body strings as absent; front-ends send `status=`.
fn non_blank(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty())
}

fn parse_status(value: Option<String>) -> Result<Option<CardStatus>, Error> {
  non_blank(value)
    .map(|v| CardStatus::from_str(v.trim()).map_err(|_| Error::UnknownStatus(v)))
    .transpose()
}

fn parse_card_type(value: Option<String>) -> Result<Option<CardType>, Error> {
  non_blank(value)
    .map(|v| CardType::from_str(v.trim()).map_err(|_| Error::UnknownCardType(v)))
    .transpose()
}

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub page:      Option<u32>,
  pub limit:     Option<u32>,
  pub search:    Option<String>,
  pub status:    Option<String>,
  pub card_type: Option<String>,
}

/// `GET /identity-cards`
pub async fn list<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  query: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Vec<CardView>>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Query(params) = query?;
  let engine = state.workflow.engine();

  let mut filter = CardFilter::new();
  if let Some(search) = params.search {
    filter = filter.search(search);
  }
  if let Some(status) = parse_status(params.status)? {
    filter = filter.status(status);
  }
  if let Some(card_type) = parse_card_type(params.card_type)? {
    filter = filter.card_type(card_type);
  }

  let request = engine.page_request(params.page, params.limit);
  let page = engine.list(&filter, request).await?;
  Ok(Json(Envelope {
    success:    true,
    data:       page.items,
    pagination: Some(page.pagination),
    message:    None,
  }))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /identity-cards/{id}`
pub async fn get_one<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<CardView>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Path(id) = path?;
  let card = state.workflow.engine().require(id).await?;
  Ok(Envelope::ok(card))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// Body of `POST /identity-cards`. Required fields are optional here so a
/// missing one is reported by name.
#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub holder_id:   Option<Uuid>,
  pub card_type:   Option<String>,
  pub valid_from:  Option<NaiveDate>,
  pub valid_until: Option<NaiveDate>,
  pub status:      Option<String>,
  pub notes:       Option<String>,
}

/// `POST /identity-cards`
pub async fn create<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  Actor(actor): Actor,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Json(body) = body?;
  let draft = CardDraft {
    holder_id:   body.holder_id,
    card_type:   parse_card_type(body.card_type)?,
    valid_from:  body.valid_from,
    valid_until: body.valid_until,
    status:      parse_status(body.status)?,
    notes:       body.notes,
  };

  let card = state.workflow.engine().create(draft, &actor).await?;
  Ok((StatusCode::CREATED, Envelope::ok(card)))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// Body of `PUT /identity-cards/{id}`: any subset of the mutable fields.
///
/// `notes` distinguishes an absent key (leave alone) from `null` or a blank
/// string (clear).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBody {
  pub card_type:   Option<String>,
  pub valid_from:  Option<NaiveDate>,
  pub valid_until: Option<NaiveDate>,
  pub status:      Option<String>,
  #[serde(default, deserialize_with = "present")]
  pub notes:       Option<Option<String>>,
}

/// Deserialise a key that is present, possibly as `null`, into `Some(_)`.
/// Paired with `#[serde(default)]` so an absent key stays `None`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

/// `PUT /identity-cards/{id}`
pub async fn update<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  Actor(actor): Actor,
  path: Result<Path<Uuid>, PathRejection>,
  body: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult<CardView>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Path(id) = path?;
  let Json(body) = body?;
  let patch = CardPatch {
    card_type: parse_card_type(body.card_type)?,
    valid_from: body.valid_from,
    valid_until: body.valid_until,
    status: parse_status(body.status)?,
    notes: body.notes.map(non_blank),
    ..CardPatch::default()
  };

  let card = state.workflow.engine().update(id, patch, &actor).await?;
  Ok(Envelope::ok(card))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /identity-cards/{id}`
pub async fn delete_one<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  Actor(actor): Actor,
  path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<()>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Path(id) = path?;
  state.workflow.engine().delete(id, &actor).await?;
  Ok(Json(Envelope {
    success:    true,
    data:       (),
    pagination: None,
    message:    Some("identity card deleted"),
  }))
}

// ─── Generate / download ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Generated {
  pub download_url: String,
  #[serde(flatten)]
  pub receipt:      GenerationReceipt,
}

/// `POST /identity-cards/{id}/generate`
pub async fn generate<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  Actor(actor): Actor,
  path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Generated>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Path(id) = path?;
  let receipt = state.workflow.generate(id, &actor).await?;
  let download_url = format!(
    "{}/identity-cards/{id}/download",
    state.config.base_path.trim_end_matches('/')
  );
  Ok(Envelope::ok(Generated { download_url, receipt }))
}

/// `GET /identity-cards/{id}/download`
pub async fn download<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, ApiError>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Path(id) = path?;
  let download = state.workflow.download(id).await?;
  let disposition = format!("attachment; filename=\"{}\"", download.file_name);
  Ok(
    (
      [
        (header::CONTENT_TYPE, download.artifact.media_type),
        (header::CONTENT_DISPOSITION, disposition),
      ],
      download.artifact.bytes,
    )
      .into_response(),
  )
}

// ─── Bulk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BulkBody {
  pub action:   String,
  #[serde(default)]
  pub card_ids: Vec<Uuid>,
}

/// `POST /identity-cards/bulk`
pub async fn bulk<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  Actor(actor): Actor,
  body: Result<Json<BulkBody>, JsonRejection>,
) -> ApiResult<BulkOutcome>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Json(body) = body?;
  let action = BulkAction::from_str(body.action.trim())?;
  let outcome = state.workflow.engine().bulk(action, &body.card_ids, &actor).await?;
  Ok(Envelope::ok(outcome))
}

// ─── Reports ──────────────────────────────────────────────────────────────────

/// `GET /identity-cards/statistics`
pub async fn statistics<S, H, R>(
  State(state): State<AppState<S, H, R>>,
) -> ApiResult<Statistics>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let stats = state.workflow.engine().statistics().await?;
  Ok(Envelope::ok(stats))
}

#[derive(Debug, Deserialize)]
pub struct ExpiringParams {
  pub days: Option<u32>,
}

/// `GET /identity-cards/expiring[?days=N]`
pub async fn expiring<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  query: Result<Query<ExpiringParams>, QueryRejection>,
) -> ApiResult<Vec<ExpiringCard>>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Query(params) = query?;
  let cards = state.workflow.engine().expiring(params.days).await?;
  Ok(Envelope::ok(cards))
}

#[derive(Debug, Deserialize)]
pub struct CreatedParams {
  pub from: NaiveDate,
  pub to:   NaiveDate,
}

/// `GET /identity-cards/created?from=YYYY-MM-DD&to=YYYY-MM-DD`
pub async fn created<S, H, R>(
  State(state): State<AppState<S, H, R>>,
  query: Result<Query<CreatedParams>, QueryRejection>,
) -> ApiResult<Vec<CardView>>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let Query(params) = query?;
  let cards = state
    .workflow
    .engine()
    .created_between(params.from, params.to)
    .await?;
  Ok(Envelope::ok(cards))
}
