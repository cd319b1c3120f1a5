//! Server assembly for the identity-card service: configuration, the HTTP
//! artifact renderer, and the top-level router.

pub mod renderer;

use std::path::{Path, PathBuf};

use axum::Router;
use idcard_api::{ApiConfig, api_router};
use idcard_core::{
  config::EngineConfig, generate::GenerationWorkflow, holder::HolderDirectory,
  render::ArtifactRenderer, store::CardStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use renderer::HttpRenderer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `IDCARD__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:         String,
  pub port:         u16,
  pub store_path:   PathBuf,
  /// Directory rendered artifacts are written to.
  pub artifact_dir: PathBuf,
  /// Endpoint of the document rendering service.
  pub renderer_url: String,
  #[serde(default)]
  pub api:          ApiConfig,
  #[serde(default)]
  pub engine:       EngineConfig,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router: the card API nested under its base
/// path, wrapped in request tracing.
pub fn router<S, H, R>(workflow: GenerationWorkflow<S, H, R>, api: ApiConfig) -> Router
where
  S: CardStore + 'static,
  H: HolderDirectory + 'static,
  R: ArtifactRenderer + 'static,
{
  let base = api.base_path.trim_end_matches('/').to_owned();
  let cards = api_router(workflow, api);

  let app = if base.is_empty() {
    Router::new().merge(cards)
  } else {
    Router::new().nest(&base, cards)
  };
  app.layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
