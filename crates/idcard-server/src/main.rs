//! idcard-server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`) layered with
//! `IDCARD__*` environment variables, opens the SQLite store, and serves the
//! identity-card API over HTTP.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use idcard_core::{engine::LifecycleEngine, generate::GenerationWorkflow};
use idcard_server::{HttpRenderer, ServerConfig, expand_tilde};
use idcard_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Identity card service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("IDCARD").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  let renderer = HttpRenderer::new(
    server_cfg.renderer_url.clone(),
    expand_tilde(&server_cfg.artifact_dir),
    server_cfg.engine.render_timeout(),
  )
  .context("failed to build renderer client")?;
  tracing::info!(artifact_dir = ?renderer.root(), "artifact storage ready");

  let engine = LifecycleEngine::new(Arc::clone(&store), server_cfg.engine.clone())
    .context("invalid engine configuration")?;
  let workflow = GenerationWorkflow::new(engine, store, Arc::new(renderer));

  let app = idcard_server::router(workflow, server_cfg.api.clone());
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
