//! Model identifiers and the manifest path convention.
//!
//! An identifier has the form `[namespace/]name[:tag]`. The namespace picks
//! one of three layouts under `<store>/manifests`:
//!
//! | Namespace       | Layout                                          |
//! |-----------------|-------------------------------------------------|
//! | none            | `registry.ollama.ai/library/<name>/<tag>`       |
//! | `hub`           | `hub/<name>/<tag>`                              |
//! | anything else   | `registry.ollama.ai/<namespace>/<name>/<tag>`   |

use crate::config::StoreConfig;
use crate::error::{Result, SyncError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which manifest layout an identifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestNamespace {
    /// Flat layout under the reserved `hub` directory.
    Hub,
    /// No namespace given: default registry, default collection.
    Library,
    /// Explicit namespace under the default registry.
    Registry(String),
}

impl ManifestNamespace {
    fn from_prefix(prefix: Option<&str>) -> Self {
        match prefix {
            None => ManifestNamespace::Library,
            Some(ns) if ns == StoreConfig::HUB_NAMESPACE => ManifestNamespace::Hub,
            Some(ns) => ManifestNamespace::Registry(ns.to_string()),
        }
    }

    /// Directory under `manifests/` that holds this namespace's models.
    fn manifest_dir(&self, manifests_root: &Path) -> PathBuf {
        match self {
            ManifestNamespace::Hub => manifests_root.join(StoreConfig::HUB_NAMESPACE),
            ManifestNamespace::Library => manifests_root
                .join(StoreConfig::REGISTRY_HOST)
                .join(StoreConfig::DEFAULT_COLLECTION),
            ManifestNamespace::Registry(ns) => {
                manifests_root.join(StoreConfig::REGISTRY_HOST).join(ns)
            }
        }
    }
}

/// A parsed local model identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelName {
    raw: String,
    namespace: ManifestNamespace,
    name: String,
    tag: String,
}

impl ModelName {
    /// Parse `[namespace/]name[:tag]`. A missing tag means `latest`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| SyncError::InvalidModelName {
            name: input.to_string(),
            reason: reason.to_string(),
        };

        let raw = input.trim();
        if raw.is_empty() {
            return Err(invalid("empty model name"));
        }

        let (prefix, rest) = match raw.split_once('/') {
            Some((ns, rest)) => (Some(ns), rest),
            None => (None, raw),
        };

        let (name, tag) = match rest.rsplit_once(':') {
            Some((_, "")) => return Err(invalid("empty tag")),
            Some((name, tag)) => (name, tag),
            None => (rest, StoreConfig::DEFAULT_TAG),
        };

        if tag.contains('/') {
            return Err(invalid("tag must not contain '/'"));
        }

        let segments = prefix.into_iter().chain(name.split('/'));
        for segment in segments.chain(std::iter::once(tag)) {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(invalid("empty or relative path segment"));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            namespace: ManifestNamespace::from_prefix(prefix),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// The identifier exactly as given (minus surrounding whitespace).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn namespace(&self) -> &ManifestNamespace {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Location of this model's manifest relative to a `manifests/` directory.
    pub fn manifest_path(&self, manifests_root: &Path) -> PathBuf {
        let mut path = self.namespace.manifest_dir(manifests_root);
        for segment in self.name.split('/') {
            path.push(segment);
        }
        path.push(&self.tag);
        path
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
