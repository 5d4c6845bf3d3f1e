//! Spitter - copy local Ollama models to a remote instance.
//!
//! Skips layers the remote already has and shows a progress bar while
//! uploading the rest.

mod progress;

use anyhow::{Context, Result};
use clap::Parser;
use spitter_core::{
    resolve_store_root, DefinitionConfig, ModelSync, OllamaShowProvider, StoreConfig, SyncConfig,
};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Progress channel capacity; events beyond this are dropped until the renderer catches up.
const PROGRESS_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "spitter", version)]
#[command(about = "Copy local Ollama models to a remote instance")]
#[command(
    long_about = "spitter copies local Ollama models to a remote instance, skipping already \
transferred layers and uploading the rest with a progress bar."
)]
struct Args {
    /// Local model name, e.g. `llama3:8b` or `namespace/model:tag`
    local_model: String,

    /// Remote Ollama server URL, e.g. `http://10.0.0.2:11434`
    remote_server: String,

    /// Local models directory (defaults to $OLLAMA_MODELS or the platform default)
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Path to the `ollama` executable used to read the Modelfile
    #[arg(long, default_value = DefinitionConfig::DEFAULT_PROGRAM)]
    ollama_bin: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Wait for the progress renderer; a panic or cancellation is logged, not returned.
async fn finish_renderer(renderer: JoinHandle<()>) {
    if let Err(e) = renderer.await {
        debug!("Progress renderer did not finish cleanly: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let store_root = match args.models_dir {
        Some(path) => path,
        None => {
            let env_value = std::env::var(StoreConfig::MODELS_ENV_VAR).ok();
            resolve_store_root(env_value.as_deref())?
        }
    };
    info!("Using local models directory {}", store_root.display());

    let config = SyncConfig::new(&args.local_model, &args.remote_server, store_root);
    let provider = OllamaShowProvider::with_program(&args.ollama_bin);

    let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);
    let renderer = tokio::spawn(progress::render(rx));

    let result = ModelSync::new(config, &provider)
        .with_progress(tx)
        .run()
        .await;

    // The sender is gone once the sync returns, so the renderer drains and exits.
    finish_renderer(renderer).await;

    match result {
        Ok(report) => {
            info!(
                "Model {} created successfully on the remote server ({} layers uploaded, {} skipped)",
                report.model,
                report.uploaded.len(),
                report.skipped.len()
            );
            Ok(())
        }
        Err(err) => {
            if err.is_retryable() {
                error!("Re-run the same command to resume; layers already uploaded are skipped");
            }
            Err(err).with_context(|| format!("failed to copy {}", args.local_model))
        }
    }
}
