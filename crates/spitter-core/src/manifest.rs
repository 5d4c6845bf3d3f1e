//! Model manifests and content digests.
//!
//! A manifest is the JSON document Ollama keeps per model tag. Only the
//! ordered `layers` list matters here; each layer names a blob by digest and
//! classifies it by media type.

use crate::error::{Result, SyncError};
use crate::model_name::ModelName;
use crate::store::LocalStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const MEDIA_TYPE_MODEL: &str = "application/vnd.ollama.image.model";
const MEDIA_TYPE_PROJECTOR: &str = "application/vnd.ollama.image.projector";
const MEDIA_TYPE_ADAPTER: &str = "application/vnd.ollama.image.adapter";

/// A content digest, `<algorithm>:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// File name of this blob inside the store's `blobs/` directory.
    pub fn blob_file_name(&self) -> String {
        format!("{}-{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (algorithm, hex) = s
            .split_once(':')
            .ok_or_else(|| format!("digest {:?} is missing the '<algorithm>:' prefix", s))?;

        let algorithm_ok = !algorithm.is_empty()
            && algorithm
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !algorithm_ok {
            return Err(format!("digest {:?} has an invalid algorithm", s));
        }

        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("digest {:?} has an invalid hex part", s));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// What a layer holds, derived from its media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Model,
    Projector,
    Adapter,
    /// License, template, params, system prompt, ...
    Other,
}

impl LayerKind {
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.starts_with(MEDIA_TYPE_MODEL) {
            LayerKind::Model
        } else if media_type.starts_with(MEDIA_TYPE_PROJECTOR) {
            LayerKind::Projector
        } else if media_type.starts_with(MEDIA_TYPE_ADAPTER) {
            LayerKind::Adapter
        } else {
            LayerKind::Other
        }
    }

    /// Whether layers of this kind are transferred and referenced with `FROM`.
    pub fn is_synced(self) -> bool {
        !matches!(self, LayerKind::Other)
    }
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub media_type: String,
    pub digest: Digest,
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        LayerKind::from_media_type(&self.media_type)
    }
}

/// Parsed model manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub layers: Vec<Layer>,
}

impl Manifest {
    /// Parse manifest JSON. `path` is only used for error context.
    pub fn from_json(data: &[u8], path: &Path) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| SyncError::Parse {
            message: e.to_string(),
            path: path.to_path_buf(),
            source: Some(e),
        })
    }

    /// Layers that are transferred, in manifest order.
    pub fn synced_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter().filter(|layer| layer.kind().is_synced())
    }
}

/// Locate, read and parse the manifest for `model`.
pub async fn load_manifest(store: &LocalStore, model: &ModelName) -> Result<Manifest> {
    let path = store.manifest_path(model);
    debug!("Loading manifest for {} from {}", model, path.display());

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SyncError::NotFound(path));
        }
        Err(e) => return Err(SyncError::io_with_path(e, path)),
    };

    let manifest = Manifest::from_json(&data, &path)?;
    debug!("Manifest for {} has {} layers", model, manifest.layers.len());
    Ok(manifest)
}
