//! `X-Actor-Id` header extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use idcard_core::card::ActorId;

use crate::error::ApiError;

pub const ACTOR_HEADER: &str = "x-actor-id";

/// The operator on whose behalf a mutating request runs. Set by the
/// authentication layer in front of this router.
pub struct Actor(pub ActorId);

impl<St> FromRequestParts<St> for Actor
where
  St: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
    let id = parts
      .headers
      .get(ACTOR_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or(ApiError::MissingActor)?;
    Ok(Actor(ActorId::new(id)))
  }
}
