//! HTTP client for the remote Ollama instance.
//!
//! Covers the three calls a sync needs:
//! 1. `HEAD /api/blobs/{digest}` to check whether a blob is already present
//! 2. `POST /api/blobs/{digest}` to stream a missing blob
//! 3. `POST /api/create` with the rewritten Modelfile

use crate::config::{NetworkConfig, RemoteEndpoint};
use crate::error::{Result, SyncError};
use crate::manifest::Digest;
use crate::progress::{ProgressSink, SyncEvent, UploadProgress};
use futures::stream;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Body of `POST /api/create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateModelRequest {
    pub name: String,
    pub modelfile: String,
}

/// A single progress line from the streamed `POST /api/create` response.
#[derive(Debug, Deserialize)]
struct CreateProgressLine {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for a remote Ollama instance.
pub struct RemoteClient {
    endpoint: RemoteEndpoint,
    client: reqwest::Client,
    /// Client with no total timeout for blob uploads (large files).
    upload_client: reqwest::Client,
    create_client: reqwest::Client,
}

impl RemoteClient {
    /// Create a client for an already validated endpoint.
    pub fn new(endpoint: RemoteEndpoint) -> Result<Self> {
        let build_err = |e: reqwest::Error| SyncError::transport("Failed to build HTTP client", e);

        let client = reqwest::Client::builder()
            .timeout(NetworkConfig::API_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(build_err)?;

        let upload_client = reqwest::Client::builder()
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            // No total timeout -- large blob uploads can take a while.
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(build_err)?;

        let create_client = reqwest::Client::builder()
            .timeout(NetworkConfig::CREATE_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(build_err)?;

        Ok(Self {
            endpoint,
            client,
            upload_client,
            create_client,
        })
    }

    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    fn blob_url(&self, digest: &Digest) -> String {
        format!("{}/api/blobs/{}", self.endpoint.base(), digest)
    }

    /// Check if the remote already holds a blob.
    ///
    /// `200` means present and `404` means absent. Any other status is a
    /// transport failure.
    pub async fn blob_exists(&self, digest: &Digest) -> Result<bool> {
        let url = self.blob_url(digest);
        debug!("Checking blob existence: {}", url);

        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| SyncError::transport(format!("Failed to check blob {}", digest), e))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(SyncError::Transport {
                message: format!("Blob check for {} returned {}", digest, status),
                source: None,
            }),
        }
    }

    /// Upload a local file as a blob, streaming the content.
    ///
    /// Returns the number of bytes sent.
    pub async fn upload_blob(
        &self,
        digest: &Digest,
        path: &Path,
        progress: &ProgressSink,
    ) -> Result<u64> {
        let url = self.blob_url(digest);
        let file_size = tokio::fs::metadata(path)
            .await
            .map_err(|e| SyncError::io_with_path(e, path))?
            .len();

        // Open before announcing the upload so a missing blob fails cleanly.
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| SyncError::io_with_path(e, path))?;

        info!(
            "Uploading layer {} ({:.1} MB)",
            digest,
            file_size as f64 / 1e6
        );
        progress.emit(SyncEvent::UploadStarted {
            digest: digest.clone(),
            total_bytes: file_size,
        });

        let state = UploadState {
            file,
            bytes_sent: 0,
            total_bytes: file_size,
            digest: digest.clone(),
            progress: progress.clone(),
        };

        // Stream the file in chunks to avoid loading it all into memory.
        let file_stream = stream::unfold(state, |mut state| async move {
            let mut buf = vec![0u8; NetworkConfig::UPLOAD_CHUNK_SIZE];
            match state.file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    state.bytes_sent += n as u64;
                    state.progress.emit(SyncEvent::UploadProgress(UploadProgress {
                        digest: state.digest.clone(),
                        bytes_sent: state.bytes_sent,
                        total_bytes: state.total_bytes,
                    }));
                    Some((Ok::<_, std::io::Error>(bytes::Bytes::from(buf)), state))
                }
                Err(e) => Some((Err(e), state)),
            }
        });

        let body = reqwest::Body::wrap_stream(file_stream);

        let response = self
            .upload_client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, file_size)
            .body(body)
            .send()
            .await
            .map_err(|e| SyncError::transport(format!("Failed to upload blob {}", digest), e))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body: String = response.text().await.unwrap_or_default();
            return Err(SyncError::UploadRejected {
                digest: digest.to_string(),
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        progress.emit(SyncEvent::UploadFinished {
            digest: digest.clone(),
            bytes: file_size,
        });
        info!("Success uploading layer {}", digest);
        Ok(file_size)
    }

    /// Create (or overwrite) a model on the remote from a Modelfile.
    pub async fn create_model(&self, name: &str, modelfile: &str) -> Result<()> {
        let url = format!("{}/api/create", self.endpoint.base());
        let request = CreateModelRequest {
            name: name.to_string(),
            modelfile: modelfile.to_string(),
        };
        debug!("Creating remote model '{}' via {}", name, url);

        let response = self
            .create_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SyncError::transport("Failed to send create request", e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body: String = response.text().await.unwrap_or_default();
            let reason = match body.trim() {
                "" => status.canonical_reason().unwrap_or("unknown").to_string(),
                text => text.to_string(),
            };
            return Err(SyncError::RemoteRejected {
                name: name.to_string(),
                status: status.as_u16(),
                reason,
            });
        }

        // Read the streamed NDJSON response to completion.
        let response_text: String = response
            .text()
            .await
            .map_err(|e| SyncError::transport("Failed to read create response", e))?;

        check_create_progress(name, &response_text)?;

        info!("Model {} created successfully on the remote server", name);
        Ok(())
    }
}

/// State threaded through the upload body stream.
struct UploadState {
    file: tokio::fs::File,
    bytes_sent: u64,
    total_bytes: u64,
    digest: Digest,
    progress: ProgressSink,
}

/// Scan `POST /api/create` NDJSON output for an error line.
fn check_create_progress(name: &str, response_text: &str) -> Result<()> {
    for line in response_text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(progress) = serde_json::from_str::<CreateProgressLine>(trimmed) {
            if let Some(err) = progress.error {
                return Err(SyncError::RemoteRejected {
                    name: name.to_string(),
                    status: StatusCode::OK.as_u16(),
                    reason: err,
                });
            }
            if let Some(status) = progress.status {
                debug!("Remote create progress: {}", status);
            }
        }
    }
    Ok(())
}
