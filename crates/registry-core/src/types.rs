//! Core data model: artifacts, aliases, dependency entries.

use crate::config::ModelKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A model file identified uniquely by its SHA-256 hash. See the Catalog
/// Store's data model: `canonical_path` is guaranteed (by the components
/// that write rows) to exist, be a regular file, and hash/size-match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Artifact {
    pub hash: String,
    pub canonical_path: PathBuf,
    pub size_bytes: u64,
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub added_at: chrono::DateTime<chrono::Utc>,
}

/// A secondary filesystem name under which an artifact's bytes are
/// reachable without duplicating storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alias {
    pub hash: String,
    pub alias_path: PathBuf,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// How an alias was realized on disk, in fallback order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Symlink,
    Hardlink,
    Copy,
}

/// An entry in a workflow's declared dependency manifest. Input data; never
/// stored verbatim in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub kind: ModelKind,
    pub filename: String,
    pub sha256: String,
    pub size: u64,
    pub urls: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub auth_provider: Option<AuthProvider>,
}

/// The closed set of credential providers the broker understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Huggingface,
    Civitai,
}

/// A single entry in the resolver's `missing` list: a dependency the
/// catalog has no record of and the filesystem does not already satisfy.
#[derive(Debug, Clone, Serialize)]
pub struct MissingEntry {
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub filename: String,
    pub sha256: String,
    pub size: u64,
    pub urls: Vec<String>,
    pub requires_auth: bool,
    pub auth_provider: Option<AuthProvider>,
}

/// How an `existing` resolver entry will be satisfied: the file is already
/// at its canonical location, or a symlink/hardlink/copy alias must be
/// created pointing at the canonical location.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExistingAction {
    Canonical,
    Symlink,
}

/// A single entry in the resolver's `existing` list.
#[derive(Debug, Clone, Serialize)]
pub struct ExistingEntry {
    pub filename: String,
    pub exists_at: PathBuf,
    #[serde(rename = "type")]
    pub kind: ModelKind,
    pub sha256: String,
    pub size: u64,
    pub action: ExistingAction,
}

/// Response body for `POST /models/check-dependencies`.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionReport {
    pub missing: Vec<MissingEntry>,
    pub existing: Vec<ExistingEntry>,
    pub total_download_size: u64,
    pub total_saved_size: u64,
}

/// Request body for `POST /models/download`.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub folder: ModelKind,
    pub filename: String,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub huggingface_token: Option<String>,
    #[serde(default)]
    pub civitai_api_key: Option<String>,
}

/// One NDJSON line of the download progress protocol. Shape is bit-exact
/// with the wire contract: each variant serializes to exactly the fields it
/// names, nothing more.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    Initial {
        message: String,
        bytes: u64,
        total_bytes: u64,
    },
    Incremental {
        progress: f64,
        bytes: u64,
        total_bytes: u64,
    },
    Complete {
        message: String,
        path: String,
        sha256: String,
    },
    Error {
        error: String,
    },
}

/// Structured summary emitted by a Migration Pass run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub new_artifacts: u64,
    pub new_aliases: u64,
    pub bytes_hashed: u64,
    pub errors: Vec<String>,
    pub dry_run: bool,
}
