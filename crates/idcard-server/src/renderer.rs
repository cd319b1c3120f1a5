//! [`ArtifactRenderer`] backed by an external rendering service.
//!
//! The render request is POSTed as JSON to `renderer_url`; the response body
//! is the finished document. Bytes are stored under `artifact_dir` as
//! `identity_card_<number>_<hash prefix>.<ext>` and read back for download.

use std::{
  io,
  path::{Path, PathBuf},
  time::Duration,
};

use bytes::Bytes;
use idcard_core::render::{Artifact, ArtifactHandle, ArtifactRenderer, RenderRequest};
use reqwest::{Client, header::CONTENT_TYPE};
use sha2::{Digest, Sha256};
use thiserror::Error;

const DEFAULT_MEDIA_TYPE: &str = "application/pdf";

/// Hex digits of the content hash kept in the file name.
const HASH_PREFIX_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum RenderError {
  #[error("renderer request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("renderer answered {status}: {body}")]
  Status { status: u16, body: String },

  #[error("renderer returned an empty document")]
  Empty,

  #[error("artifact storage error: {0}")]
  Io(#[from] io::Error),
}

fn extension_for(media_type: &str) -> &'static str {
  match media_type {
    "application/pdf" => "pdf",
    "image/png" => "png",
    "image/jpeg" => "jpg",
    "image/svg+xml" => "svg",
    _ => "bin",
  }
}

fn media_type_for(path: &Path) -> &'static str {
  match path.extension().and_then(|e| e.to_str()) {
    Some("pdf") => "application/pdf",
    Some("png") => "image/png",
    Some("jpg") => "image/jpeg",
    Some("svg") => "image/svg+xml",
    _ => "application/octet-stream",
  }
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String { hex::encode(Sha256::digest(bytes)) }

/// Renders through HTTP and keeps artifacts on local disk.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpRenderer {
  client:   Client,
  endpoint: String,
  root:     PathBuf,
}

impl HttpRenderer {
  pub fn new(
    endpoint: impl Into<String>,
    root: impl Into<PathBuf>,
    timeout: Duration,
  ) -> Result<Self, RenderError> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, endpoint: endpoint.into(), root: root.into() })
  }

  pub fn root(&self) -> &Path { &self.root }

  /// Resolve a stored artifact path. Only bare file names directly under the
  /// root are accepted.
  fn resolve(&self, path: &str) -> Option<PathBuf> {
    let name = Path::new(path).file_name()?;
    (name == path).then(|| self.root.join(name))
  }

  async fn store(
    &self,
    request: &RenderRequest,
    media_type: &str,
    bytes: &Bytes,
  ) -> Result<ArtifactHandle, RenderError> {
    let content_hash = content_hash(bytes);
    let file_name = format!(
      "identity_card_{}_{}.{}",
      request.card_number,
      &content_hash[..HASH_PREFIX_LEN],
      extension_for(media_type)
    );

    tokio::fs::create_dir_all(&self.root).await?;
    let target = self.root.join(&file_name);
    let staging = self.root.join(format!(".{file_name}.tmp"));
    tokio::fs::write(&staging, bytes).await?;
    tokio::fs::rename(&staging, &target).await?;

    Ok(ArtifactHandle {
      path: file_name,
      content_hash,
      media_type: media_type.to_owned(),
    })
  }
}

impl ArtifactRenderer for HttpRenderer {
  type Error = RenderError;

  async fn render(&self, request: &RenderRequest) -> Result<ArtifactHandle, RenderError> {
    let response = self.client.post(&self.endpoint).json(request).send().await?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(RenderError::Status { status: status.as_u16(), body });
    }

    let media_type = response
      .headers()
      .get(CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .and_then(|v| v.split(';').next())
      .map(|v| v.trim().to_owned())
      .unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_owned());
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
      return Err(RenderError::Empty);
    }

    let handle = self.store(request, &media_type, &bytes).await?;
    tracing::debug!(
      card_number = %request.card_number,
      path = %handle.path,
      size = bytes.len(),
      "artifact stored"
    );
    Ok(handle)
  }

  async fn fetch(&self, path: &str) -> Result<Option<Artifact>, RenderError> {
    let Some(full) = self.resolve(path) else {
      tracing::warn!(%path, "rejecting artifact path outside storage root");
      return Ok(None);
    };

    match tokio::fs::read(&full).await {
      Ok(bytes) => Ok(Some(Artifact {
        media_type: media_type_for(&full).to_owned(),
        bytes:      Bytes::from(bytes),
      })),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }
}
