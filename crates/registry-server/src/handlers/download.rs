use crate::server::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use registry_core::types::DownloadRequest;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// `POST /models/download` — starts (or joins) a download and streams its
/// progress back as newline-delimited JSON.
pub async fn handle_download(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DownloadRequest>,
) -> Response {
    let has_token = req.huggingface_token.is_some() || req.civitai_api_key.is_some();
    let stream = match state.registry.download_engine.download(req).await {
        Ok(stream) => stream,
        Err(e) => {
            return (
                StatusCode::from_u16(e.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    // has_token is logged, never the credential itself — see CredentialBroker.
    tracing::debug!(has_token, "download stream opened");

    let ndjson = stream.filter_map(|item| async move {
        match item {
            Ok(event) => match serde_json::to_vec(&event) {
                Ok(mut line) => {
                    line.push(b'\n');
                    Some(Ok::<_, std::io::Error>(line))
                }
                Err(e) => {
                    warn!(error = %e, "failed to serialize progress event");
                    None
                }
            },
            Err(_lagged) => {
                warn!("progress subscriber lagged behind, dropping missed frames");
                None
            }
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(ndjson))
        .expect("building a streaming response from a well-formed body cannot fail")
}
