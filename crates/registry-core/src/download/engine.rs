//! Streams a URL to a temp file, hashes as it writes, verifies size and
//! hash, publishes atomically, records the result in the catalog.

use super::pending::{emit, LastProgress, PendingDownloads, StartOrJoin};
use crate::aliaser::Aliaser;
use crate::catalog::Catalog;
use crate::config::{NetworkConfig, PathsConfig};
use crate::credentials::CredentialBroker;
use crate::error::{RegistryError, Result};
use crate::path_policy::PathPolicy;
use crate::types::{Artifact, AuthProvider, DownloadRequest, ProgressEvent};
use crate::url_admission::UrlAdmission;
use chrono::Utc;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

/// A download's progress stream as handed back to an HTTP handler. Boxed
/// because a freshly started fetch is a plain `BroadcastStream`, while a
/// joiner of an in-flight fetch is primed with a synthetic first event
/// ahead of the live broadcast — two distinct concrete stream types that
/// both need to flow through the same return type.
pub type DownloadStream = Pin<Box<dyn Stream<Item = std::result::Result<ProgressEvent, BroadcastStreamRecvError>> + Send>>;

/// Owns the pieces a download needs: admission, path resolution, the
/// credential broker, the coalescing table, and the catalog it publishes
/// into. One instance is shared (behind `Arc`) across all server requests.
pub struct DownloadEngine {
    http: reqwest::Client,
    path_policy: PathPolicy,
    admission: UrlAdmission,
    credentials: CredentialBroker,
    catalog: Arc<Catalog>,
    pending: PendingDownloads,
    idle_timeout: Duration,
}

impl DownloadEngine {
    pub fn new(
        path_policy: PathPolicy,
        admission: UrlAdmission,
        catalog: Arc<Catalog>,
        idle_timeout: Duration,
    ) -> Self {
        let redirect_admission = admission.clone();
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::custom(move |attempt| {
                let host = attempt.url().host_str().map(|h| h.to_string());
                match &host {
                    Some(h) if redirect_admission.is_host_allowed(h) => attempt.follow(),
                    _ => {
                        let host = host.unwrap_or_else(|| "<no host>".into());
                        attempt.error(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("redirect to disallowed host {host}"),
                        ))
                    }
                }
            }))
            .build()
            .expect("building the http client with a custom redirect policy cannot fail");

        Self {
            http,
            path_policy,
            admission,
            credentials: CredentialBroker::new(),
            catalog,
            pending: PendingDownloads::new(),
            idle_timeout,
        }
    }

    /// Entry point matching `POST /models/download`. Pre-condition
    /// failures (bad name, forbidden host, and now a source that rejects
    /// the given credentials) return `Err` directly so the handler can
    /// answer a non-2xx status before committing to a chunked response.
    /// Every failure past that point is instead surfaced as a terminal
    /// `ProgressEvent::Error` on the returned stream, per the error table.
    pub async fn download(self: &Arc<Self>, req: DownloadRequest) -> Result<DownloadStream> {
        let (_original_url, sanitized_url) = self.admission.admit(&req.url)?;
        let dst_abs = self.path_policy.resolve(req.folder, &req.filename)?;

        if let Some(expected_hash) = req.sha256.as_deref() {
            if let Some(artifact) = self.catalog.get_by_hash(expected_hash)? {
                return self.short_circuit_existing(&artifact, &dst_abs).await;
            }
        }

        if dst_abs.exists() {
            if let Some(event) = self
                .ingest_existing_file(&dst_abs, req.sha256.as_deref())
                .await?
            {
                return Ok(single_event_stream(event));
            }
        }

        let key = req
            .sha256
            .clone()
            .unwrap_or_else(|| dst_abs.to_string_lossy().to_string());

        match self.pending.start_or_join(&key) {
            StartOrJoin::Joined(receiver, primed) => {
                let tail = BroadcastStream::new(receiver);
                let stream: DownloadStream = match primed {
                    Some(event) => {
                        let primed: std::result::Result<ProgressEvent, BroadcastStreamRecvError> = Ok(event);
                        Box::pin(futures::stream::once(async move { primed }).chain(tail))
                    }
                    None => Box::pin(tail),
                };
                Ok(stream)
            }
            StartOrJoin::Started(sender, last_progress) => {
                let request_id = Uuid::new_v4().to_string();
                self.register_credentials(&request_id, &req);

                // Connect (and authenticate) before answering the caller at
                // all: an unauthorized source must fail the request itself,
                // not merely surface as an in-stream error inside an
                // already-200 response.
                let response = match self.connect(&request_id, &req).await {
                    Ok(response) => response,
                    Err(e) => {
                        let _ = sender.send(ProgressEvent::Error {
                            error: e.to_string(),
                        });
                        self.credentials.scrub(&request_id);
                        self.pending.finish(&key);
                        return Err(e);
                    }
                };

                let engine = Arc::clone(self);
                let receiver = sender.subscribe();
                tokio::spawn(async move {
                    engine
                        .stream_and_publish(
                            request_id,
                            req,
                            dst_abs,
                            sanitized_url,
                            sender,
                            last_progress,
                            key,
                            response,
                        )
                        .await;
                });
                Ok(Box::pin(BroadcastStream::new(receiver)))
            }
        }
    }

    async fn short_circuit_existing(&self, artifact: &Artifact, dst_abs: &Path) -> Result<DownloadStream> {
        if dst_abs == artifact.canonical_path {
            info!(hash = %artifact.hash, path = %dst_abs.display(), "download short-circuited: already canonical");
            return Ok(single_event_stream(ProgressEvent::Complete {
                message: "Already exists".into(),
                path: dst_abs.to_string_lossy().to_string(),
                sha256: artifact.hash.clone(),
            }));
        }
        let aliaser = Aliaser::new(&self.catalog);
        aliaser.create_alias(&artifact.hash, &artifact.canonical_path, dst_abs)?;
        info!(hash = %artifact.hash, path = %dst_abs.display(), "download short-circuited: alias created");
        Ok(single_event_stream(ProgressEvent::Complete {
            message: "Alias created".into(),
            path: dst_abs.to_string_lossy().to_string(),
            sha256: artifact.hash.clone(),
        }))
    }

    /// If `dst_abs` already exists on disk, either recognize it as already
    /// cataloged, or hash it and ingest it as a fresh artifact. Returns
    /// `None` when the on-disk file doesn't match the caller's expected
    /// hash, in which case the caller proceeds to overwrite it by download.
    async fn ingest_existing_file(
        &self,
        dst_abs: &Path,
        expected_hash: Option<&str>,
    ) -> Result<Option<ProgressEvent>> {
        if let Some((artifact, true)) = self.catalog.get_by_path(dst_abs)? {
            return Ok(Some(ProgressEvent::Complete {
                message: "Already exists".into(),
                path: dst_abs.to_string_lossy().to_string(),
                sha256: artifact.hash,
            }));
        }
        let data = tokio::fs::read(dst_abs)
            .await
            .map_err(|e| RegistryError::io_with_path(e, dst_abs))?;
        let hash_hex = hex::encode(Sha256::digest(&data));
        if let Some(expected) = expected_hash {
            if !expected.eq_ignore_ascii_case(&hash_hex) {
                return Ok(None);
            }
        }
        self.catalog.insert_artifact(&Artifact {
            hash: hash_hex.clone(),
            canonical_path: dst_abs.to_path_buf(),
            size_bytes: data.len() as u64,
            source_url: None,
            metadata: serde_json::json!({}),
            added_at: Utc::now(),
        })?;
        Ok(Some(ProgressEvent::Complete {
            message: "Already exists".into(),
            path: dst_abs.to_string_lossy().to_string(),
            sha256: hash_hex,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_and_publish(
        self: Arc<Self>,
        request_id: String,
        req: DownloadRequest,
        dst_abs: std::path::PathBuf,
        sanitized_url: Url,
        sender: broadcast::Sender<ProgressEvent>,
        last_progress: LastProgress,
        key: String,
        first_response: reqwest::Response,
    ) {
        if let Err(e) = self
            .attempt_download(&request_id, &req, &dst_abs, &sanitized_url, &sender, &last_progress, first_response)
            .await
        {
            if !matches!(e, RegistryError::Cancelled) {
                warn!(error = %e, filename = %req.filename, "download failed");
            }
            let _ = sender.send(ProgressEvent::Error {
                error: e.to_string(),
            });
        }
        self.credentials.scrub(&request_id);
        self.pending.finish(&key);
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt_download(
        &self,
        request_id: &str,
        req: &DownloadRequest,
        dst_abs: &Path,
        sanitized_url: &Url,
        sender: &broadcast::Sender<ProgressEvent>,
        last_progress: &LastProgress,
        first_response: reqwest::Response,
    ) -> Result<()> {
        let base = self.path_policy.base();
        let tmp_dir = PathsConfig::tmp_dir(base);
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| RegistryError::io_with_path(e, &tmp_dir))?;
        let temp_path = tmp_dir.join(format!("{}.part", Uuid::new_v4()));

        let mut last_err = None;
        let mut outcome = None;
        let mut response = Some(first_response);
        for attempt in 0..2u8 {
            let connected = match response.take() {
                Some(r) => Ok(r),
                None => self.connect(request_id, req).await,
            };
            let connected = match connected {
                Ok(r) => r,
                Err(e) if attempt == 0 && e.is_retryable() => {
                    warn!(error = %e, "transient error reconnecting, retrying once");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => {
                    last_err = Some(e);
                    break;
                }
            };

            match self
                .stream_body(connected, req, &temp_path, sender, last_progress)
                .await
            {
                Ok(result) => {
                    outcome = Some(result);
                    break;
                }
                Err(e) if attempt == 0 && e.is_retryable() => {
                    warn!(error = %e, "transient download error, retrying once");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => {
                    last_err = Some(e);
                    break;
                }
            }
        }

        let (bytes_written, hash_hex) = match outcome {
            Some(o) => o,
            None => {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(last_err.expect("loop always sets last_err on failure"));
            }
        };

        if let Some(expected_size) = req.size {
            if bytes_written != expected_size {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(RegistryError::SizeMismatch {
                    expected: expected_size,
                    actual: bytes_written,
                });
            }
        }
        if let Some(expected_hash) = &req.sha256 {
            if !expected_hash.eq_ignore_ascii_case(&hash_hex) {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(RegistryError::HashMismatch {
                    expected: expected_hash.clone(),
                    actual: hash_hex,
                });
            }
        }

        if sender.receiver_count() == 0 {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(RegistryError::Cancelled);
        }

        if let Some(parent) = dst_abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::io_with_path(e, parent))?;
        }
        tokio::fs::rename(&temp_path, dst_abs)
            .await
            .map_err(|e| RegistryError::io_with_path(e, dst_abs))?;

        self.catalog.insert_artifact(&Artifact {
            hash: hash_hex.clone(),
            canonical_path: dst_abs.to_path_buf(),
            size_bytes: bytes_written,
            source_url: Some(sanitized_url.to_string()),
            metadata: serde_json::json!({ "display_name": req.display_name }),
            added_at: Utc::now(),
        })?;

        info!(hash = %hash_hex, path = %dst_abs.display(), bytes = bytes_written, "download published");
        emit(
            sender,
            last_progress,
            ProgressEvent::Complete {
                message: "Download complete".into(),
                path: dst_abs.to_string_lossy().to_string(),
                sha256: hash_hex,
            },
        );

        Ok(())
    }

    /// Sends the outbound GET request and validates the response status.
    /// A 401/403 becomes `Unauthorized`; a redirect blocked by the custom
    /// policy (installed in `new`) surfaces as `UrlForbidden` rather than a
    /// generic network error, since it was rejected by admission policy,
    /// not a transport failure.
    async fn connect(&self, request_id: &str, req: &DownloadRequest) -> Result<reqwest::Response> {
        let builder = self.http.get(req.url.as_str());
        let (builder, _attached) = self.credentials.attach(request_id, builder);
        let response = builder.send().await.map_err(|e| {
            if e.is_redirect() {
                RegistryError::UrlForbidden(format!("redirect blocked: {e}"))
            } else {
                RegistryError::Network(e)
            }
        })?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(RegistryError::Unauthorized(format!(
                "source rejected credentials with status {}",
                response.status()
            )));
        }
        response.error_for_status().map_err(RegistryError::Network)
    }

    /// Streams `response`'s body to `temp_path`, hashing as it writes.
    /// Emits `Initial` once, then `Incremental` either every 1% of a known
    /// total or every `NetworkConfig::CHUNK_SIZE` bytes when the total is
    /// unknown (no `Content-Length` and no caller-supplied `size`).
    /// Periodically checks whether any subscriber is still listening and
    /// aborts with `Cancelled` if not, so a disconnected HTTP client stops
    /// the fetch instead of letting it run to completion unobserved.
    async fn stream_body(
        &self,
        response: reqwest::Response,
        req: &DownloadRequest,
        temp_path: &Path,
        sender: &broadcast::Sender<ProgressEvent>,
        last_progress: &LastProgress,
    ) -> Result<(u64, String)> {
        let total_bytes = response.content_length().unwrap_or_else(|| req.size.unwrap_or(0));
        emit(
            sender,
            last_progress,
            ProgressEvent::Initial {
                message: format!("Starting download of {}", req.filename),
                bytes: 0,
                total_bytes,
            },
        );

        let mut file = tokio::fs::File::create(temp_path)
            .await
            .map_err(|e| RegistryError::io_with_path(e, temp_path))?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;
        let mut last_emitted_percent: u64 = 0;
        let mut last_emitted_bytes: u64 = 0;

        loop {
            if sender.receiver_count() == 0 {
                return Err(RegistryError::Cancelled);
            }

            let next = tokio::time::timeout(self.idle_timeout, stream.next())
                .await
                .map_err(|_| RegistryError::NetworkTimeout(self.idle_timeout))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(RegistryError::Network)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| RegistryError::io_with_path(e, temp_path))?;
            hasher.update(&chunk);
            bytes_written += chunk.len() as u64;

            if total_bytes > 0 {
                let percent = bytes_written.saturating_mul(100) / total_bytes;
                if percent > last_emitted_percent {
                    last_emitted_percent = percent;
                    emit(
                        sender,
                        last_progress,
                        ProgressEvent::Incremental {
                            progress: bytes_written as f64 / total_bytes as f64,
                            bytes: bytes_written,
                            total_bytes,
                        },
                    );
                }
            } else if bytes_written.saturating_sub(last_emitted_bytes) >= NetworkConfig::CHUNK_SIZE as u64 {
                last_emitted_bytes = bytes_written;
                emit(
                    sender,
                    last_progress,
                    ProgressEvent::Incremental {
                        progress: 0.0,
                        bytes: bytes_written,
                        total_bytes: 0,
                    },
                );
            }
        }
        file.flush()
            .await
            .map_err(|e| RegistryError::io_with_path(e, temp_path))?;
        let hash_hex = hex::encode(hasher.finalize());
        Ok((bytes_written, hash_hex))
    }

    fn register_credentials(&self, request_id: &str, req: &DownloadRequest) {
        if let Some(token) = &req.huggingface_token {
            self.credentials
                .register(request_id, AuthProvider::Huggingface, token.clone());
        }
        if let Some(key) = &req.civitai_api_key {
            self.credentials
                .register(request_id, AuthProvider::Civitai, key.clone());
        }
    }
}

fn single_event_stream(event: ProgressEvent) -> DownloadStream {
    let (tx, rx) = broadcast::channel(1);
    let _ = tx.send(event);
    Box::pin(BroadcastStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelKind, RegistryConfig};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_for(base: &Path, catalog: Arc<Catalog>) -> Arc<DownloadEngine> {
        let config = RegistryConfig::new(base);
        Arc::new(DownloadEngine::new(
            PathPolicy::new(base),
            UrlAdmission::new(vec!["127.0.0.1".into(), "localhost".into()]),
            catalog,
            config.idle_timeout,
        ))
    }

    #[tokio::test]
    async fn cold_download_publishes_and_hashes() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let engine = engine_for(tmp.path(), catalog.clone());

        let body = b"0123456789";
        let expected_hash = hex::encode(Sha256::digest(body));

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model.safetensors"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(&server)
            .await;

        let req = DownloadRequest {
            url: format!("{}/model.safetensors", server.uri()),
            folder: ModelKind::Checkpoint,
            filename: "model.safetensors".into(),
            sha256: Some(expected_hash.clone()),
            size: Some(10),
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };

        let mut stream = engine.download(req).await.unwrap();
        let mut last = None;
        while let Some(Ok(event)) = stream.next().await {
            last = Some(event);
        }
        match last.unwrap() {
            ProgressEvent::Complete { sha256, .. } => assert_eq!(sha256, expected_hash),
            other => panic!("expected Complete, got {other:?}"),
        }

        let artifact = catalog.get_by_hash(&expected_hash).unwrap().unwrap();
        assert_eq!(artifact.size_bytes, 10);
        assert!(catalog.list_aliases_for(&expected_hash).unwrap().is_empty());
    }

    #[tokio::test]
    async fn hash_mismatch_leaves_no_trace() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let engine = engine_for(tmp.path(), catalog.clone());

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model.safetensors"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&server)
            .await;

        let req = DownloadRequest {
            url: format!("{}/model.safetensors", server.uri()),
            folder: ModelKind::Checkpoint,
            filename: "model.safetensors".into(),
            sha256: Some("deadbeef".repeat(8)),
            size: Some(10),
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };

        let mut stream = engine.download(req).await.unwrap();
        let mut saw_error = false;
        while let Some(Ok(event)) = stream.next().await {
            if let ProgressEvent::Error { .. } = event {
                saw_error = true;
            }
        }
        assert!(saw_error);
        assert!(!tmp.path().join("checkpoints/model.safetensors").exists());
        assert!(catalog.list_artifacts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn forbidden_host_is_rejected_before_any_fetch() {
        let tmp = TempDir::new().unwrap();
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let engine = engine_for(tmp.path(), catalog);

        let req = DownloadRequest {
            url: "https://evil.example/x.safetensors".into(),
            folder: ModelKind::Checkpoint,
            filename: "x.safetensors".into(),
            sha256: None,
            size: None,
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };
        assert!(engine.download(req).await.is_err());
    }

    #[tokio::test]
    async fn unauthorized_source_fails_before_a_stream_is_returned() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let engine = engine_for(tmp.path(), catalog.clone());

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gated.safetensors"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let req = DownloadRequest {
            url: format!("{}/gated.safetensors", server.uri()),
            folder: ModelKind::Checkpoint,
            filename: "gated.safetensors".into(),
            sha256: None,
            size: None,
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };

        match engine.download(req).await {
            Err(RegistryError::Unauthorized(_)) => {}
            other => panic!("expected Err(Unauthorized), got {other:?}"),
        }
        assert!(catalog.list_artifacts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_hash_request_creates_alias_without_refetch() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let engine = engine_for(tmp.path(), catalog.clone());

        let body = b"0123456789";
        let expected_hash = hex::encode(Sha256::digest(body));
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/model.safetensors"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let first = DownloadRequest {
            url: format!("{}/model.safetensors", server.uri()),
            folder: ModelKind::Checkpoint,
            filename: "model.safetensors".into(),
            sha256: Some(expected_hash.clone()),
            size: Some(10),
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };
        let mut stream = engine.download(first).await.unwrap();
        while stream.next().await.is_some() {}

        let second = DownloadRequest {
            url: format!("{}/model.safetensors", server.uri()),
            folder: ModelKind::Checkpoint,
            filename: "alt.safetensors".into(),
            sha256: Some(expected_hash.clone()),
            size: Some(10),
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };
        let mut stream = engine.download(second).await.unwrap();
        let mut last = None;
        while let Some(Ok(event)) = stream.next().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(ProgressEvent::Complete { .. })));
        assert_eq!(catalog.list_aliases_for(&expected_hash).unwrap().len(), 1);
        assert!(tmp.path().join("checkpoints/alt.safetensors").exists());
    }

    #[tokio::test]
    async fn late_joiner_to_a_coalesced_download_sees_progress_not_a_gap() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let catalog = Arc::new(Catalog::open_in_memory().unwrap());
        let engine = engine_for(tmp.path(), catalog.clone());

        let body = vec![7u8; NetworkConfig::CHUNK_SIZE * 3];
        let expected_hash = hex::encode(Sha256::digest(&body));
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.safetensors"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let req = DownloadRequest {
            url: format!("{}/big.safetensors", server.uri()),
            folder: ModelKind::Checkpoint,
            filename: "big.safetensors".into(),
            sha256: Some(expected_hash.clone()),
            size: Some(body.len() as u64),
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };

        let first_stream = engine.download(req).await.unwrap();

        let joiner_req = DownloadRequest {
            url: format!("{}/big.safetensors", server.uri()),
            folder: ModelKind::Checkpoint,
            filename: "big-alt.safetensors".into(),
            sha256: Some(expected_hash.clone()),
            size: Some(body.len() as u64),
            display_name: None,
            huggingface_token: None,
            civitai_api_key: None,
        };
        let mut joiner_stream = engine.download(joiner_req).await.unwrap();

        let mut saw_complete = false;
        while let Some(Ok(event)) = joiner_stream.next().await {
            if matches!(event, ProgressEvent::Complete { .. }) {
                saw_complete = true;
            }
        }
        assert!(saw_complete);

        futures::pin_mut!(first_stream);
        while first_stream.next().await.is_some() {}
    }
}
