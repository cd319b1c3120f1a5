//! JSON REST API for identity cards.
//!
//! Exposes an axum [`Router`] backed by a [`GenerationWorkflow`], which in
//! turn wraps the lifecycle engine. Authentication, TLS, and transport
//! concerns are the caller's responsibility; the authenticated operator is
//! passed in the `X-Actor-Id` header.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", idcard_api::api_router(workflow, api_config))
//! ```

pub mod actor;
pub mod cards;
pub mod error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use idcard_core::{
  generate::GenerationWorkflow, holder::HolderDirectory, render::ArtifactRenderer,
  store::CardStore,
};
use serde::Deserialize;

pub use error::ApiError;

/// Settings for the HTTP surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Prefix the router is nested under; used to build download links.
  pub base_path: String,
}

impl Default for ApiConfig {
  fn default() -> Self { Self { base_path: "/api".to_owned() } }
}

/// Shared handler state. Cloning is cheap.
pub struct AppState<S, H, R> {
  pub workflow: GenerationWorkflow<S, H, R>,
  pub config:   Arc<ApiConfig>,
}

impl<S, H, R> Clone for AppState<S, H, R> {
  fn clone(&self) -> Self {
    Self { workflow: self.workflow.clone(), config: Arc::clone(&self.config) }
  }
}

/// Build a fully-materialised API router for `workflow`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, H, R>(workflow: GenerationWorkflow<S, H, R>, config: ApiConfig) -> Router<()>
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let state = AppState { workflow, config: Arc::new(config) };

  Router::new()
    .route(
      "/identity-cards",
      get(cards::list::<S, H, R>).post(cards::create::<S, H, R>),
    )
    // Static segments take precedence over `{id}`.
    .route("/identity-cards/statistics", get(cards::statistics::<S, H, R>))
    .route("/identity-cards/expiring", get(cards::expiring::<S, H, R>))
    .route("/identity-cards/created", get(cards::created::<S, H, R>))
    .route("/identity-cards/bulk", post(cards::bulk::<S, H, R>))
    .route(
      "/identity-cards/{id}",
      get(cards::get_one::<S, H, R>)
        .put(cards::update::<S, H, R>)
        .delete(cards::delete_one::<S, H, R>),
    )
    .route("/identity-cards/{id}/generate", post(cards::generate::<S, H, R>))
    .route("/identity-cards/{id}/download", get(cards::download::<S, H, R>))
    .with_state(state)
}
