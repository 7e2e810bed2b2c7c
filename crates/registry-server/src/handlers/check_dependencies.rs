use crate::server::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use registry_core::types::DependencyEntry;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CheckDependenciesRequest {
    dependencies: HashMap<String, Vec<DependencyEntry>>,
}

pub async fn handle_check_dependencies(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckDependenciesRequest>,
) -> Response {
    let resolver = state.registry.resolver();
    match resolver.resolve(&req.dependencies) {
        Ok(report) => Json(report).into_response(),
        Err(e) => (
            StatusCode::from_u16(e.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
