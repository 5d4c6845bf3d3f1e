//! Progress reporting for sync runs.
//!
//! The engine publishes [`SyncEvent`]s on an optional bounded channel without
//! ever waiting on the receiver. Events that do not fit in the channel, or
//! whose receiver is gone, are discarded; a sync never stalls on progress.

use crate::manifest::Digest;
use std::fmt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;

/// Phases of a sync run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Validating,
    Loading,
    Checking,
    Uploading,
    Rewriting,
    Creating,
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Validating => "validating",
            SyncPhase::Loading => "loading manifest",
            SyncPhase::Checking => "checking remote blobs",
            SyncPhase::Uploading => "uploading blobs",
            SyncPhase::Rewriting => "rewriting Modelfile",
            SyncPhase::Creating => "creating remote model",
            SyncPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Byte-level progress of a single blob upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadProgress {
    pub digest: Digest,
    /// Bytes handed to the HTTP body so far.
    pub bytes_sent: u64,
    /// Local file size, queried before the upload started.
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Percentage complete (0-100). An empty blob counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_sent as f64 / self.total_bytes as f64) * 100.0
        }
    }
}

/// Events emitted while a sync runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A new phase was entered.
    Phase(SyncPhase),
    /// The remote already holds this blob.
    LayerSkipped { digest: Digest },
    UploadStarted { digest: Digest, total_bytes: u64 },
    UploadProgress(UploadProgress),
    UploadFinished { digest: Digest, bytes: u64 },
    ModelCreated { name: String },
    /// The run stopped; `phase` is where it failed.
    Failed { phase: SyncPhase },
}

/// Sending half of the progress channel, optional throughout the engine.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::Sender<SyncEvent>>,
}

impl ProgressSink {
    pub fn new(tx: Option<mpsc::Sender<SyncEvent>>) -> Self {
        Self { tx }
    }

    /// A sink that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Publish an event if the channel has room.
    pub fn emit(&self, event: SyncEvent) {
        if let Some(ref tx) = self.tx {
            match tx.try_send(event) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(event)) => {
                    trace!("Progress channel full, dropping {:?}", event);
                }
            }
        }
    }
}
