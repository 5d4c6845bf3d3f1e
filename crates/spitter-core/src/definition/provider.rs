//! Sources of local Modelfile text.

use crate::config::DefinitionConfig;
use crate::error::{Result, SyncError};
use crate::model_name::ModelName;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Supplies the local Modelfile for a model.
#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    /// Return the raw Modelfile text, or `DefinitionUnavailable`.
    async fn modelfile(&self, model: &ModelName) -> Result<String>;
}

/// Reads the Modelfile by running `ollama show <model> --modelfile`.
#[derive(Debug, Clone)]
pub struct OllamaShowProvider {
    program: PathBuf,
    timeout: Duration,
}

impl OllamaShowProvider {
    /// Use `ollama` from `PATH`.
    pub fn new() -> Self {
        Self::with_program(DefinitionConfig::DEFAULT_PROGRAM)
    }

    /// Use a specific `ollama` executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DefinitionConfig::SHOW_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OllamaShowProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DefinitionProvider for OllamaShowProvider {
    async fn modelfile(&self, model: &ModelName) -> Result<String> {
        let unavailable = |message: String| SyncError::DefinitionUnavailable {
            model: model.to_string(),
            message,
        };

        debug!(
            "Running {} show {} --modelfile",
            self.program.display(),
            model
        );

        let output = Command::new(&self.program)
            .arg("show")
            .arg(model.as_str())
            .arg("--modelfile")
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| unavailable(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| {
                unavailable(format!(
                    "failed to execute {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!("ollama show stderr: {}", stderr.trim());
        }

        if !output.status.success() {
            return Err(unavailable(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
