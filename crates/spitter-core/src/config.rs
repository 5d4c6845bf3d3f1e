//! Configuration for a sync run.
//!
//! Holds the run inputs ([`SyncConfig`]), the validated remote endpoint, and
//! the constants for network behavior, local store layout and Modelfile lookup.

use crate::error::{Result, SyncError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Timeout for short API calls (blob existence check).
    pub const API_TIMEOUT: Duration = Duration::from_secs(10);
    /// Connect timeout for blob uploads, which have no total timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Timeout for model creation, which blocks while the remote builds the model.
    pub const CREATE_TIMEOUT: Duration = Duration::from_secs(300);
    /// Chunk size for streaming blob uploads (8 MB).
    pub const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;
    pub const USER_AGENT: &'static str = concat!("spitter/", env!("CARGO_PKG_VERSION"));
}

/// Layout of a local Ollama model store.
pub struct StoreConfig;

impl StoreConfig {
    pub const MANIFESTS_DIR_NAME: &'static str = "manifests";
    pub const BLOBS_DIR_NAME: &'static str = "blobs";
    pub const REGISTRY_HOST: &'static str = "registry.ollama.ai";
    pub const DEFAULT_COLLECTION: &'static str = "library";
    pub const HUB_NAMESPACE: &'static str = "hub";
    pub const DEFAULT_TAG: &'static str = "latest";
    /// Environment variable overriding the store root.
    pub const MODELS_ENV_VAR: &'static str = "OLLAMA_MODELS";
}

/// Settings for reading a local model's Modelfile.
pub struct DefinitionConfig;

impl DefinitionConfig {
    /// Executable asked for the Modelfile when none is configured.
    pub const DEFAULT_PROGRAM: &'static str = "ollama";
    /// Timeout for the `ollama show --modelfile` subprocess.
    pub const SHOW_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Inputs for a single sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Local model identifier, `[namespace/]name[:tag]`.
    pub local_model: String,
    /// Base URL of the remote Ollama instance.
    pub remote_server: String,
    /// Root of the local model store (the directory holding `manifests/` and `blobs/`).
    pub store_root: PathBuf,
}

impl SyncConfig {
    pub fn new(
        local_model: impl Into<String>,
        remote_server: impl Into<String>,
        store_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            local_model: local_model.into(),
            remote_server: remote_server.into(),
            store_root: store_root.into(),
        }
    }

    /// Replace the store root.
    pub fn with_store_root(mut self, store_root: impl Into<PathBuf>) -> Self {
        self.store_root = store_root.into();
        self
    }

    pub fn store_root(&self) -> &Path {
        &self.store_root
    }
}

/// A remote endpoint that has been checked to be an `http`/`https` URL with a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    url: Url,
    base: String,
}

impl RemoteEndpoint {
    /// Validate a user-supplied endpoint string.
    ///
    /// Performs no I/O. Rejects strings without a scheme, non-http(s) schemes,
    /// URLs without a host, and URLs carrying a query or fragment.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let invalid = |reason: String| SyncError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let url = Url::parse(endpoint.trim()).map_err(|e| invalid(e.to_string()))?;

        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme '{}'", other))),
        }

        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(invalid("missing host".to_string()));
        }

        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed".to_string()));
        }

        let base = url.as_str().trim_end_matches('/').to_string();
        Ok(Self { url, base })
    }

    /// Base URL without a trailing slash, ready for `format!("{}/api/...")`.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl std::fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.base)
    }
}
