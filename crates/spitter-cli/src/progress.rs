//! Terminal rendering of sync progress.

use indicatif::{ProgressBar, ProgressStyle};
use spitter_core::{SyncEvent, SyncPhase};
use tokio::sync::mpsc;
use tracing::debug;

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

fn upload_bar(total_bytes: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_bytes);
    let style = ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_message("Uploading");
    bar
}

/// Consume sync events until the sender side is dropped.
pub async fn render(mut rx: mpsc::Receiver<SyncEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::UploadStarted { total_bytes, .. } => {
                bar = Some(upload_bar(total_bytes));
            }
            SyncEvent::UploadProgress(progress) => {
                if let Some(ref bar) = bar {
                    bar.set_position(progress.bytes_sent);
                }
            }
            SyncEvent::UploadFinished { .. } => {
                if let Some(bar) = bar.take() {
                    bar.finish();
                }
            }
            SyncEvent::Failed { phase } => {
                if let Some(bar) = bar.take() {
                    bar.abandon();
                }
                debug!("Sync stopped while {}", phase);
            }
            SyncEvent::Phase(SyncPhase::Done) => {
                debug!("Sync finished");
            }
            SyncEvent::Phase(_)
            | SyncEvent::LayerSkipped { .. }
            | SyncEvent::ModelCreated { .. } => {}
        }
    }

    if let Some(bar) = bar {
        bar.abandon();
    }
}
