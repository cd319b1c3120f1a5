//! The generation workflow: holder lookup, rendering, and the transition to
//! `generated`, plus download of the rendered artifact.

use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  card::{ActorId, CardId, CardPatch, CardStatus, CardView},
  engine::{LifecycleEngine, bounded},
  holder::HolderDirectory,
  render::{Artifact, ArtifactHandle, ArtifactRenderer, RenderRequest},
  store::CardStore,
};

/// Returned by [`GenerationWorkflow::generate`]. Carries the storage handle,
/// never the artifact bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReceipt {
  pub card:     CardView,
  pub artifact: ArtifactHandle,
}

/// A generated artifact ready to stream to the caller.
#[derive(Debug, Clone)]
pub struct Download {
  /// Suggested attachment name, e.g. `identity_card_ID20250417.pdf`.
  pub file_name: String,
  pub artifact:  Artifact,
}

pub struct GenerationWorkflow<S, H, R> {
  engine:    LifecycleEngine<S>,
  directory: Arc<H>,
  renderer:  Arc<R>,
}

impl<S, H, R> Clone for GenerationWorkflow<S, H, R> {
  fn clone(&self) -> Self {
    Self {
      engine:    self.engine.clone(),
      directory: Arc::clone(&self.directory),
      renderer:  Arc::clone(&self.renderer),
    }
  }
}

impl<S, H, R> GenerationWorkflow<S, H, R>
where
  S: CardStore,
  H: HolderDirectory,
  R: ArtifactRenderer,
{
  pub fn new(engine: LifecycleEngine<S>, directory: Arc<H>, renderer: Arc<R>) -> Self {
    Self { engine, directory, renderer }
  }

  pub fn engine(&self) -> &LifecycleEngine<S> { &self.engine }

  /// Render the card's artifact and move it to `generated`.
  pub async fn generate(&self, id: CardId, actor: &ActorId) -> Result<GenerationReceipt> {
    let config = self.engine.config();
    let view = self.engine.require(id).await?;
    let card = view.card;

    if !card.status.can_transition_to(CardStatus::Generated) {
      return Err(Error::IllegalTransition { from: card.status, to: CardStatus::Generated });
    }

    let holder = bounded(
      config.store_timeout(),
      "get_holder",
      self.directory.get_holder(card.holder_id),
      Error::Directory,
    )
    .await?
    .ok_or(Error::HolderNotFound(card.holder_id))?;

    let request = RenderRequest::new(&card, &holder);
    let artifact = bounded(
      config.render_timeout(),
      "render",
      self.renderer.render(&request),
      Error::Renderer,
    )
    .await?;

    let patch = CardPatch {
      status: Some(CardStatus::Generated),
      artifact_path: Some(Some(artifact.path.clone())),
      generated_at: Some(Some(self.engine.clock().now())),
      generated_by: Some(Some(actor.clone())),
      ..CardPatch::default()
    };
    let card = self.engine.update(id, patch, actor).await?;

    tracing::info!(
      card_id = %id,
      card_number = %card.card.card_number,
      path = %artifact.path,
      %actor,
      "identity card generated"
    );
    Ok(GenerationReceipt { card, artifact })
  }

  /// Fetch the rendered artifact. Cards that do not exist and cards that are
  /// not currently `generated` are reported identically.
  pub async fn download(&self, id: CardId) -> Result<Download> {
    let card = self
      .engine
      .get(id)
      .await?
      .filter(|v| v.card.status == CardStatus::Generated)
      .ok_or(Error::ArtifactNotFound(id))?
      .card;
    let path = card.artifact_path.as_deref().ok_or(Error::ArtifactNotFound(id))?;

    let artifact = bounded(
      self.engine.config().render_timeout(),
      "fetch_artifact",
      self.renderer.fetch(path),
      Error::Renderer,
    )
    .await?
    .ok_or_else(|| {
      tracing::warn!(card_id = %id, %path, "artifact missing from storage");
      Error::ArtifactNotFound(id)
    })?;

    let extension = Path::new(path)
      .extension()
      .and_then(|e| e.to_str())
      .unwrap_or("pdf");
    Ok(Download {
      file_name: format!("identity_card_{}.{extension}", card.card_number),
      artifact,
    })
  }
}
