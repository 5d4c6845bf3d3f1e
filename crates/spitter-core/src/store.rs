//! Local Ollama model store layout.
//!
//! The store root holds `manifests/` (one JSON document per model tag) and
//! `blobs/` (content files named `<algorithm>-<hex>`). The engine only reads
//! from it.

use crate::config::StoreConfig;
use crate::error::Result;
use crate::manifest::Digest;
use crate::model_name::ModelName;
use std::path::{Path, PathBuf};

/// Read-only view over a local model store.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join(StoreConfig::MANIFESTS_DIR_NAME)
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join(StoreConfig::BLOBS_DIR_NAME)
    }

    /// Manifest file for a model.
    pub fn manifest_path(&self, model: &ModelName) -> PathBuf {
        model.manifest_path(&self.manifests_dir())
    }

    /// Blob file for a digest.
    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.blobs_dir().join(digest.blob_file_name())
    }
}

/// Resolve the store root from the `OLLAMA_MODELS` value (if any).
///
/// Takes the variable's value as an argument so callers decide where it
/// comes from; the engine itself never reads the process environment.
///
/// # Platform Behavior
/// - A set value other than `""` or `"*"` always wins
/// - **Windows**: `%USERPROFILE%/.ollama/models`
/// - **macOS**: `$HOME/.ollama/models`
/// - **Other**: `/usr/share/ollama/.ollama/models` (the Linux service install)
pub fn resolve_store_root(models_env: Option<&str>) -> Result<PathBuf> {
    if let Some(value) = models_env {
        let value = value.trim();
        if !value.is_empty() && value != "*" {
            return Ok(PathBuf::from(value));
        }
    }

    default_store_root()
}

#[cfg(any(target_os = "windows", target_os = "macos"))]
fn default_store_root() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| crate::error::SyncError::Io {
        message: "Could not determine home directory".to_string(),
        path: None,
        source: None,
    })?;
    Ok(home.join(".ollama").join("models"))
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn default_store_root() -> Result<PathBuf> {
    Ok(PathBuf::from("/usr/share/ollama/.ollama/models"))
}
