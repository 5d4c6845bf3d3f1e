//! Spitter Core - copy local Ollama models to a remote Ollama instance.
//!
//! A sync reads the model's manifest from the local store, uploads every
//! weight, projector and adapter blob the remote does not already hold, and
//! recreates the model on the remote from a rewritten Modelfile that points
//! at those blobs by digest.
//!
//! # Modules
//!
//! - `sync` - The [`ModelSync`] orchestrator, the only entry point a caller needs
//! - `manifest` - Manifest parsing and content digests
//! - `model_name` - Model identifiers and the manifest path convention
//! - `store` - Local store layout and root resolution
//! - `remote` - HTTP client for the remote instance
//! - `definition` - Modelfile sources and rewriting
//! - `progress` - Progress events
//!
//! # Example
//!
//! ```no_run
//! use spitter_core::{ModelSync, OllamaShowProvider, SyncConfig};
//!
//! # async fn run() -> spitter_core::Result<()> {
//! let store_root = spitter_core::resolve_store_root(None)?;
//! let config = SyncConfig::new("llama3:8b", "http://10.0.0.2:11434", store_root);
//! let provider = OllamaShowProvider::new();
//! let report = ModelSync::new(config, &provider).run().await?;
//! println!("uploaded {} blobs", report.uploaded.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod definition;
pub mod error;
pub mod manifest;
pub mod model_name;
pub mod progress;
pub mod remote;
pub mod store;
pub mod sync;

pub use config::{DefinitionConfig, NetworkConfig, RemoteEndpoint, StoreConfig, SyncConfig};
pub use definition::{
    filter_modelfile, rewrite_modelfile, DefinitionProvider, OllamaShowProvider,
};
pub use error::{Result, SyncError};
pub use manifest::{load_manifest, Digest, Layer, LayerKind, Manifest};
pub use model_name::{ManifestNamespace, ModelName};
pub use progress::{SyncEvent, SyncPhase, UploadProgress};
pub use remote::{CreateModelRequest, RemoteClient};
pub use store::{resolve_store_root, LocalStore};
pub use sync::{ModelSync, SyncReport};
