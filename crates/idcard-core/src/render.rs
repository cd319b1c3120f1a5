//! Artifact rendering: the document produced for a generated card.
//!
//! Rasterising the credential is delegated to an external service; this
//! module only defines what is sent to it and what comes back.

use std::future::Future;

use bytes::Bytes;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
  card::{CardType, IdentityCard},
  holder::Holder,
};

/// Everything printed on a card. Built only from card and holder fields, so
/// the same inputs always produce the same request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderRequest {
  pub card_number:     String,
  pub card_type:       CardType,
  pub holder_name:     String,
  pub external_id:     String,
  pub class_name:      Option<String>,
  pub department_name: Option<String>,
  pub photo:           Option<String>,
  pub valid_from:      NaiveDate,
  pub valid_until:     NaiveDate,
}

impl RenderRequest {
  pub fn new(card: &IdentityCard, holder: &Holder) -> Self {
    Self {
      card_number:     card.card_number.clone(),
      card_type:       card.card_type,
      holder_name:     holder.name.clone(),
      external_id:     holder.external_id.clone(),
      class_name:      holder.class_name.clone(),
      department_name: holder.department_name.clone(),
      photo:           holder.photo.clone(),
      valid_from:      card.valid_from,
      valid_until:     card.valid_until,
    }
  }
}

/// Where a rendered artifact was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
  /// Path relative to the renderer's storage root.
  pub path:         String,
  /// SHA-256 hex digest of the artifact bytes.
  pub content_hash: String,
  pub media_type:   String,
}

/// A stored artifact read back for download.
#[derive(Debug, Clone)]
pub struct Artifact {
  pub media_type: String,
  pub bytes:      Bytes,
}

pub trait ArtifactRenderer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Render and store the artifact for `request`.
  fn render<'a>(
    &'a self,
    request: &'a RenderRequest,
  ) -> impl Future<Output = Result<ArtifactHandle, Self::Error>> + Send + 'a;

  /// Read a previously rendered artifact. Returns `None` if it is gone.
  fn fetch<'a>(
    &'a self,
    path: &'a str,
  ) -> impl Future<Output = Result<Option<Artifact>, Self::Error>> + Send + 'a;
}
