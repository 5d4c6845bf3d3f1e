//! Sync orchestration.
//!
//! A run walks `Validating → Loading → {Checking, Uploading}* → Rewriting →
//! Creating → Done`. The first error ends the run and is returned unchanged.
//! Blobs uploaded before a failure stay on the remote, and the existence
//! check makes a re-run skip them.

use crate::config::{RemoteEndpoint, SyncConfig};
use crate::definition::{rewrite_modelfile, DefinitionProvider};
use crate::error::Result;
use crate::manifest::{load_manifest, Digest};
use crate::model_name::ModelName;
use crate::progress::{ProgressSink, SyncEvent, SyncPhase};
use crate::remote::RemoteClient;
use crate::store::LocalStore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of a successful sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Model name as created on the remote.
    pub model: String,
    /// Blobs that were uploaded during this run.
    pub uploaded: Vec<Digest>,
    /// Blobs the remote already held.
    pub skipped: Vec<Digest>,
    /// Digests referenced by the `FROM @...` lines, in manifest order.
    pub base_layers: Vec<Digest>,
    pub bytes_uploaded: u64,
}

/// Copies one local model to a remote Ollama instance.
pub struct ModelSync<'a> {
    config: SyncConfig,
    provider: &'a dyn DefinitionProvider,
    progress: ProgressSink,
}

impl<'a> ModelSync<'a> {
    pub fn new(config: SyncConfig, provider: &'a dyn DefinitionProvider) -> Self {
        Self {
            config,
            provider,
            progress: ProgressSink::disabled(),
        }
    }

    /// Publish [`SyncEvent`]s on `tx` while running. Events that find the
    /// channel full are dropped; the run never waits for the receiver.
    pub fn with_progress(mut self, tx: mpsc::Sender<SyncEvent>) -> Self {
        self.progress = ProgressSink::new(Some(tx));
        self
    }

    /// Run the sync to completion or to the first error.
    pub async fn run(&self) -> Result<SyncReport> {
        let mut phase = SyncPhase::Validating;
        match self.run_phases(&mut phase).await {
            Ok(report) => {
                self.enter(&mut phase, SyncPhase::Done);
                Ok(report)
            }
            Err(err) => {
                warn!(
                    "Sync of {} failed while {}: {}",
                    self.config.local_model, phase, err
                );
                self.progress.emit(SyncEvent::Failed { phase });
                Err(err)
            }
        }
    }

    fn enter(&self, current: &mut SyncPhase, next: SyncPhase) {
        debug!("Sync phase: {}", next);
        *current = next;
        self.progress.emit(SyncEvent::Phase(next));
    }

    async fn run_phases(&self, phase: &mut SyncPhase) -> Result<SyncReport> {
        // Validating: no I/O before both inputs are known to be well-formed.
        self.progress.emit(SyncEvent::Phase(SyncPhase::Validating));
        let endpoint = RemoteEndpoint::parse(&self.config.remote_server)?;
        let model = ModelName::parse(&self.config.local_model)?;
        let store = LocalStore::new(&self.config.store_root);

        self.enter(phase, SyncPhase::Loading);
        let manifest = load_manifest(&store, &model).await?;

        info!("Copying model {} to {}...", model, endpoint);
        let remote = RemoteClient::new(endpoint)?;

        let mut report = SyncReport {
            model: model.to_string(),
            ..SyncReport::default()
        };

        for layer in manifest.synced_layers() {
            let digest = &layer.digest;

            self.enter(phase, SyncPhase::Checking);
            if remote.blob_exists(digest).await? {
                info!("Skipping upload for already created layer {}", digest);
                self.progress.emit(SyncEvent::LayerSkipped {
                    digest: digest.clone(),
                });
                report.skipped.push(digest.clone());
            } else {
                self.enter(phase, SyncPhase::Uploading);
                let blob_path = store.blob_path(digest);
                let bytes = remote
                    .upload_blob(digest, &blob_path, &self.progress)
                    .await?;
                report.uploaded.push(digest.clone());
                report.bytes_uploaded += bytes;
            }

            report.base_layers.push(digest.clone());
        }

        self.enter(phase, SyncPhase::Rewriting);
        let local_modelfile = self.provider.modelfile(&model).await?;
        let modelfile = rewrite_modelfile(&local_modelfile, &report.base_layers);
        debug!("Rewritten Modelfile:\n{}", modelfile);

        self.enter(phase, SyncPhase::Creating);
        remote.create_model(model.as_str(), &modelfile).await?;
        self.progress.emit(SyncEvent::ModelCreated {
            name: report.model.clone(),
        });

        info!(
            "Synced {}: {} uploaded, {} already present",
            report.model,
            report.uploaded.len(),
            report.skipped.len()
        );
        Ok(report)
    }
}
