//! End-to-end sync tests against an in-process mock of the Ollama API.
//!
//! The mock records every blob check, blob upload and create request so the
//! tests can assert exactly which remote calls a sync made.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    routing::{head, post},
    Json, Router,
};
use serde_json::Value;
use spitter_core::{
    DefinitionProvider, ModelName, ModelSync, NetworkConfig, SyncConfig, SyncError, SyncEvent,
    SyncPhase,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

const MODEL_MEDIA: &str = "application/vnd.ollama.image.model";
const PROJECTOR_MEDIA: &str = "application/vnd.ollama.image.projector";
const LICENSE_MEDIA: &str = "application/vnd.ollama.image.license";

const LOCAL_MODELFILE: &str = "# Modelfile generated by \"ollama show\"\n\
# FROM llama:7b\n\
FROM /usr/share/ollama/.ollama/models/blobs/sha256-aaa\n\
TEMPLATE \"{{ .Prompt }}\"\n\
PARAMETER temperature 0.7";

/// Recorded state of the mock remote.
struct MockRemote {
    present: Mutex<HashSet<String>>,
    heads: Mutex<Vec<String>>,
    uploads: Mutex<Vec<(String, Vec<u8>)>>,
    creates: Mutex<Vec<Value>>,
    head_status: Option<StatusCode>,
    upload_status: StatusCode,
    create_status: StatusCode,
    create_body: String,
}

impl MockRemote {
    fn new(present: &[&str]) -> Self {
        Self {
            present: Mutex::new(present.iter().map(|d| d.to_string()).collect()),
            heads: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            creates: Mutex::new(Vec::new()),
            head_status: None,
            upload_status: StatusCode::CREATED,
            create_status: StatusCode::OK,
            create_body: "{\"status\":\"using existing layer\"}\n{\"status\":\"success\"}\n"
                .to_string(),
        }
    }

    fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }

    fn upload_digests(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(d, _)| d.clone())
            .collect()
    }

    fn creates(&self) -> Vec<Value> {
        self.creates.lock().unwrap().clone()
    }
}

async fn blob_head(
    State(remote): State<Arc<MockRemote>>,
    Path(digest): Path<String>,
) -> StatusCode {
    remote.heads.lock().unwrap().push(digest.clone());
    if let Some(status) = remote.head_status {
        return status;
    }
    if remote.present.lock().unwrap().contains(&digest) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn blob_upload(
    State(remote): State<Arc<MockRemote>>,
    Path(digest): Path<String>,
    body: Bytes,
) -> StatusCode {
    remote
        .uploads
        .lock()
        .unwrap()
        .push((digest.clone(), body.to_vec()));
    if remote.upload_status == StatusCode::CREATED {
        remote.present.lock().unwrap().insert(digest);
    }
    remote.upload_status
}

async fn create(
    State(remote): State<Arc<MockRemote>>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    remote.creates.lock().unwrap().push(body);
    (remote.create_status, remote.create_body.clone())
}

/// Serve the mock on an ephemeral port and return its base URL.
async fn start_mock(remote: Arc<MockRemote>) -> String {
    let app = Router::new()
        .route("/api/blobs/:digest", head(blob_head).post(blob_upload))
        .route("/api/create", post(create))
        .layer(DefaultBodyLimit::disable())
        .with_state(remote);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Returns fixed Modelfile text, or fails like a missing `ollama` binary.
struct StaticProvider {
    text: Option<String>,
}

impl StaticProvider {
    fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl DefinitionProvider for StaticProvider {
    async fn modelfile(&self, model: &ModelName) -> spitter_core::Result<String> {
        self.text
            .clone()
            .ok_or_else(|| SyncError::DefinitionUnavailable {
                model: model.to_string(),
                message: "ollama not installed".to_string(),
            })
    }
}

/// Create a local store holding one model manifest and its blobs.
///
/// `layers` are `(media type, hex, blob contents)`; a `None` blob is left off disk.
fn create_store(model: &str, layers: &[(&str, &str, Option<&[u8]>)]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = spitter_core::LocalStore::new(temp_dir.path());
    let name = ModelName::parse(model).unwrap();

    let manifest_layers: Vec<Value> = layers
        .iter()
        .map(|(media, hex, blob)| {
            serde_json::json!({
                "mediaType": media,
                "digest": format!("sha256:{}", hex),
                "size": blob.map(|b| b.len()).unwrap_or(0),
            })
        })
        .collect();
    let manifest = serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
        "layers": manifest_layers,
    });

    let manifest_path = store.manifest_path(&name);
    std::fs::create_dir_all(manifest_path.parent().unwrap()).unwrap();
    std::fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

    std::fs::create_dir_all(store.blobs_dir()).unwrap();
    for (_, hex, blob) in layers {
        if let Some(bytes) = blob {
            std::fs::write(store.blobs_dir().join(format!("sha256-{}", hex)), bytes).unwrap();
        }
    }

    temp_dir
}

/// Deterministic blob contents of the given length.
fn patterned_blob(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn llama_store() -> TempDir {
    create_store(
        "llama:7b",
        &[
            (MODEL_MEDIA, "aaa", Some(b"weights-bytes".as_slice())),
            (PROJECTOR_MEDIA, "bbb", Some(b"projector".as_slice())),
            (LICENSE_MEDIA, "ccc", Some(b"MIT".as_slice())),
        ],
    )
}

#[tokio::test]
async fn test_end_to_end_partial_remote() {
    let store = llama_store();
    let remote = Arc::new(MockRemote::new(&["sha256:bbb"]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let report = ModelSync::new(config, &provider).run().await.unwrap();

    // License layer is never checked or uploaded.
    assert_eq!(remote.heads(), vec!["sha256:aaa", "sha256:bbb"]);
    assert_eq!(remote.upload_digests(), vec!["sha256:aaa"]);
    assert_eq!(remote.uploads.lock().unwrap()[0].1, b"weights-bytes".to_vec());

    let creates = remote.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0]["name"], "llama:7b");
    let modelfile = creates[0]["modelfile"].as_str().unwrap();
    assert!(modelfile.starts_with("FROM @sha256:aaa\nFROM @sha256:bbb\n"));
    assert_eq!(
        modelfile,
        "FROM @sha256:aaa\nFROM @sha256:bbb\nTEMPLATE \"{{ .Prompt }}\"\nPARAMETER temperature 0.7"
    );
    assert!(!modelfile.contains("/usr/share/ollama"));

    assert_eq!(report.model, "llama:7b");
    assert_eq!(report.uploaded.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.bytes_uploaded, b"weights-bytes".len() as u64);
    let base: Vec<String> = report.base_layers.iter().map(|d| d.to_string()).collect();
    assert_eq!(base, vec!["sha256:aaa", "sha256:bbb"]);
}

#[tokio::test]
async fn test_all_layers_present_uploads_nothing() {
    let store = llama_store();
    let remote = Arc::new(MockRemote::new(&["sha256:aaa", "sha256:bbb"]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let report = ModelSync::new(config, &provider).run().await.unwrap();

    assert!(remote.upload_digests().is_empty());
    assert!(report.uploaded.is_empty());
    assert_eq!(remote.creates().len(), 1);
}

#[tokio::test]
async fn test_rerun_is_idempotent_for_blobs() {
    let store = llama_store();
    let remote = Arc::new(MockRemote::new(&[]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let first = ModelSync::new(config.clone(), &provider).run().await.unwrap();
    assert_eq!(first.uploaded.len(), 2);

    let second = ModelSync::new(config, &provider).run().await.unwrap();
    assert!(second.uploaded.is_empty());
    assert_eq!(second.skipped.len(), 2);

    // Only the first run uploaded anything; both runs created the model.
    assert_eq!(remote.upload_digests(), vec!["sha256:aaa", "sha256:bbb"]);
    assert_eq!(remote.creates().len(), 2);
    assert_eq!(remote.creates()[0], remote.creates()[1]);
}

#[tokio::test]
async fn test_registry_namespace_model() {
    let store = create_store(
        "sammcj/qwen:32b",
        &[(MODEL_MEDIA, "abc123", Some(b"q".as_slice()))],
    );
    let remote = Arc::new(MockRemote::new(&[]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new("FROM qwen\nSYSTEM \"be brief\"");

    let config = SyncConfig::new("sammcj/qwen:32b", format!("{}/", url), store.path());
    ModelSync::new(config, &provider).run().await.unwrap();

    let creates = remote.creates();
    assert_eq!(creates[0]["name"], "sammcj/qwen:32b");
    assert_eq!(
        creates[0]["modelfile"],
        "FROM @sha256:abc123\nSYSTEM \"be brief\""
    );
}

#[tokio::test]
async fn test_invalid_endpoint_makes_no_requests() {
    let store = llama_store();
    let remote = Arc::new(MockRemote::new(&[]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    // Same host and port, but without a scheme.
    let schemeless = url.trim_start_matches("http://").to_string();
    for endpoint in [schemeless, url.replace("http://", "ftp://")] {
        let config = SyncConfig::new("llama:7b", endpoint, store.path());
        let err = ModelSync::new(config, &provider).run().await.unwrap_err();
        assert_eq!(err.kind(), "InvalidEndpoint");
    }

    assert!(remote.heads().is_empty());
    assert!(remote.creates().is_empty());
}

#[tokio::test]
async fn test_upload_rejected_stops_before_create() {
    let store = llama_store();
    let mut mock = MockRemote::new(&[]);
    mock.upload_status = StatusCode::INTERNAL_SERVER_ERROR;
    let remote = Arc::new(mock);
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let err = ModelSync::new(config, &provider).run().await.unwrap_err();

    match err {
        SyncError::UploadRejected { digest, status, .. } => {
            assert_eq!(digest, "sha256:aaa");
            assert_eq!(status, 500);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Aborted on the first layer: the projector was never checked.
    assert_eq!(remote.heads(), vec!["sha256:aaa"]);
    assert!(remote.creates().is_empty());
}

#[tokio::test]
async fn test_unexpected_head_status_is_transport_error() {
    let store = llama_store();
    let mut mock = MockRemote::new(&[]);
    mock.head_status = Some(StatusCode::SERVICE_UNAVAILABLE);
    let remote = Arc::new(mock);
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let err = ModelSync::new(config, &provider).run().await.unwrap_err();

    assert_eq!(err.kind(), "TransportError");
    assert!(err.is_retryable());
    assert!(remote.upload_digests().is_empty());
}

#[tokio::test]
async fn test_unreachable_remote_is_transport_error() {
    let store = llama_store();
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    // Reserve a port, then free it so nothing is listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = SyncConfig::new("llama:7b", format!("http://{}", addr), store.path());
    let err = ModelSync::new(config, &provider).run().await.unwrap_err();
    assert_eq!(err.kind(), "TransportError");
}

#[tokio::test]
async fn test_create_rejected_surfaces_status_and_reason() {
    let store = llama_store();
    let mut mock = MockRemote::new(&["sha256:aaa", "sha256:bbb"]);
    mock.create_status = StatusCode::BAD_REQUEST;
    mock.create_body = "{\"error\":\"invalid model name\"}".to_string();
    let remote = Arc::new(mock);
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let err = ModelSync::new(config, &provider).run().await.unwrap_err();

    match err {
        SyncError::RemoteRejected {
            name,
            status,
            reason,
        } => {
            assert_eq!(name, "llama:7b");
            assert_eq!(status, 400);
            assert!(reason.contains("invalid model name"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_create_stream_error_line_is_rejection() {
    let store = llama_store();
    let mut mock = MockRemote::new(&["sha256:aaa", "sha256:bbb"]);
    mock.create_body =
        "{\"status\":\"parsing modelfile\"}\n{\"error\":\"unsupported architecture\"}\n"
            .to_string();
    let remote = Arc::new(mock);
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let err = ModelSync::new(config, &provider).run().await.unwrap_err();

    assert_eq!(err.kind(), "RemoteRejected");
    assert!(err.to_string().contains("unsupported architecture"));
}

#[tokio::test]
async fn test_missing_local_blob_is_io_error() {
    let store = create_store(
        "llama:7b",
        &[
            (MODEL_MEDIA, "aaa", None),
            (PROJECTOR_MEDIA, "bbb", Some(b"projector".as_slice())),
        ],
    );
    let remote = Arc::new(MockRemote::new(&[]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let err = ModelSync::new(config, &provider).run().await.unwrap_err();

    match err {
        SyncError::Io { path, .. } => {
            assert!(path.unwrap().ends_with("blobs/sha256-aaa"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(remote.upload_digests().is_empty());
    assert!(remote.creates().is_empty());
}

#[tokio::test]
async fn test_definition_failure_keeps_uploaded_blobs() {
    let store = llama_store();
    let remote = Arc::new(MockRemote::new(&[]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::failing();

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let err = ModelSync::new(config.clone(), &provider)
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "DefinitionUnavailable");
    assert_eq!(remote.upload_digests(), vec!["sha256:aaa", "sha256:bbb"]);
    assert!(remote.creates().is_empty());

    // Retrying with a working provider uploads nothing new.
    let provider = StaticProvider::new(LOCAL_MODELFILE);
    let report = ModelSync::new(config, &provider).run().await.unwrap();
    assert!(report.uploaded.is_empty());
    assert_eq!(remote.upload_digests().len(), 2);
    assert_eq!(remote.creates().len(), 1);
}

#[tokio::test]
async fn test_progress_events() {
    let store = llama_store();
    let remote = Arc::new(MockRemote::new(&["sha256:bbb"]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);
    let (tx, mut rx) = mpsc::channel(64);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    ModelSync::new(config, &provider)
        .with_progress(tx)
        .run()
        .await
        .unwrap();

    // Every event was queued before `run` returned.
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let total = b"weights-bytes".len() as u64;
    assert_eq!(events.first(), Some(&SyncEvent::Phase(SyncPhase::Validating)));
    assert_eq!(events.last(), Some(&SyncEvent::Phase(SyncPhase::Done)));
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::UploadStarted { digest, total_bytes }
            if digest.to_string() == "sha256:aaa" && *total_bytes == total
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::UploadProgress(p) if p.bytes_sent == total && p.percent() == 100.0
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SyncEvent::LayerSkipped { digest } if digest.to_string() == "sha256:bbb"
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncEvent::ModelCreated { name } if name == "llama:7b")));

    let phases: Vec<SyncPhase> = events
        .iter()
        .filter_map(|e| match e {
            SyncEvent::Phase(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            SyncPhase::Validating,
            SyncPhase::Loading,
            SyncPhase::Checking,
            SyncPhase::Uploading,
            SyncPhase::Checking,
            SyncPhase::Rewriting,
            SyncPhase::Creating,
            SyncPhase::Done,
        ]
    );
}

#[tokio::test]
async fn test_multi_chunk_upload_reports_increasing_progress() {
    let chunk = NetworkConfig::UPLOAD_CHUNK_SIZE;
    let blob = patterned_blob(chunk * 2 + chunk / 2 + 17);
    let store = create_store("llama:7b", &[(MODEL_MEDIA, "aaa", Some(blob.as_slice()))]);
    let remote = Arc::new(MockRemote::new(&[]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);
    let (tx, mut rx) = mpsc::channel(256);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let report = ModelSync::new(config, &provider)
        .with_progress(tx)
        .run()
        .await
        .unwrap();

    let total = blob.len() as u64;
    assert_eq!(report.bytes_uploaded, total);
    {
        let uploads = remote.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "sha256:aaa");
        assert!(uploads[0].1 == blob, "uploaded bytes differ from the local blob");
    }

    let mut sent = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let SyncEvent::UploadProgress(p) = event {
            assert_eq!(p.total_bytes, total);
            sent.push(p.bytes_sent);
        }
    }
    assert!(sent.len() > 1, "expected several progress events, got {sent:?}");
    assert!(sent.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(sent.last(), Some(&total));
}

#[tokio::test]
async fn test_undrained_progress_channel_does_not_stall_upload() {
    let blob = patterned_blob(NetworkConfig::UPLOAD_CHUNK_SIZE * 3);
    let store = create_store("llama:7b", &[(MODEL_MEDIA, "aaa", Some(blob.as_slice()))]);
    let remote = Arc::new(MockRemote::new(&[]));
    let url = start_mock(remote.clone()).await;
    let provider = StaticProvider::new(LOCAL_MODELFILE);
    // Far fewer slots than the run emits, and nobody reads them.
    let (tx, mut rx) = mpsc::channel(4);

    let config = SyncConfig::new("llama:7b", &url, store.path());
    let sync = ModelSync::new(config, &provider).with_progress(tx);
    let report = tokio::time::timeout(Duration::from_secs(60), sync.run())
        .await
        .expect("sync stalled on a full progress channel")
        .unwrap();

    assert_eq!(report.bytes_uploaded, blob.len() as u64);
    assert_eq!(remote.uploads.lock().unwrap()[0].1.len(), blob.len());
    assert_eq!(remote.creates().len(), 1);
    let mut queued = 0;
    while rx.try_recv().is_ok() {
        queued += 1;
    }
    assert_eq!(queued, 4);
}
