//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use idcard_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] idcard_core::Error),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("missing X-Actor-Id header")]
  MissingActor,
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::Core(e) => match e.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
      },
      ApiError::BadRequest(_) | ApiError::MissingActor => StatusCode::BAD_REQUEST,
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      ApiError::Core(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
        let cause = std::error::Error::source(e).map(ToString::to_string);
        tracing::error!(error = %e, ?cause, "request failed");
        "internal server error".to_owned()
      }
      other => other.to_string(),
    };
    (status, Json(json!({ "success": false, "message": message }))).into_response()
  }
}
