//! Configuration constants and the runtime-variable parts of registry setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Network-facing timeouts and retry bounds.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Per-request idle timeout before a download fails with `NetworkTimeout`.
    pub const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
    /// Streaming read buffer / temp-file write chunk size.
    pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;
    /// Absolute ceiling on an ephemeral credential's lifetime, regardless of
    /// activity.
    pub const CREDENTIAL_TTL: Duration = Duration::from_secs(60 * 60);
    /// Query parameter names stripped from any URL before it is persisted.
    pub const CREDENTIAL_PARAMS: &'static [&'static str] =
        &["token", "api_key", "key", "access_token"];
    /// Default host allowlist for URL admission.
    pub const DEFAULT_ALLOWED_HOSTS: &'static [&'static str] =
        &["huggingface.co", "civitai.com", "127.0.0.1", "localhost"];
}

/// Filesystem layout rooted at a configurable base directory.
pub struct PathsConfig;

impl PathsConfig {
    pub const CATALOG_DIR: &'static str = ".registry";
    pub const CATALOG_FILE: &'static str = "catalog.sqlite3";
    pub const TMP_DIR: &'static str = ".cache/tmp";

    pub fn catalog_path(base: &Path) -> PathBuf {
        base.join(Self::CATALOG_DIR).join(Self::CATALOG_FILE)
    }

    pub fn tmp_dir(base: &Path) -> PathBuf {
        base.join(Self::TMP_DIR)
    }
}

/// Allowed extensions for artifacts the Path Policy will admit, per §4.1.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "safetensors",
    "ckpt",
    "pt",
    "pth",
    "bin",
    "gguf",
    "onnx",
    "sft",
    "yaml",
];

/// Closed set of model kinds and the directory each one maps to under the
/// registry's base path. Declared as a table rather than a match expression
/// so the mapping is data, not control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Checkpoint,
    Lora,
    Vae,
    ControlNet,
    Upscale,
    TextEncoder,
    DiffusionModel,
    ClipVision,
    Embedding,
}

impl ModelKind {
    const ALL: &'static [(ModelKind, &'static str)] = &[
        (ModelKind::Checkpoint, "checkpoints"),
        (ModelKind::Lora, "loras"),
        (ModelKind::Vae, "vae"),
        (ModelKind::ControlNet, "controlnet"),
        (ModelKind::Upscale, "upscale_models"),
        (ModelKind::TextEncoder, "text_encoders"),
        (ModelKind::DiffusionModel, "diffusion_models"),
        (ModelKind::ClipVision, "clip_vision"),
        (ModelKind::Embedding, "embeddings"),
    ];

    pub fn folder_name(&self) -> &'static str {
        Self::ALL.iter().find(|(k, _)| k == self).unwrap().1
    }

    pub fn all_kinds() -> impl Iterator<Item = ModelKind> {
        Self::ALL.iter().map(|(k, _)| *k)
    }
}

impl std::str::FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.replace('_', "-");
        Self::ALL
            .iter()
            .find(|(k, folder)| k.as_str() == normalized || *folder == normalized || *folder == s)
            .map(|(k, _)| *k)
            .ok_or_else(|| format!("unknown model kind: {s}"))
    }
}

impl ModelKind {
    /// The wire/display form, matching the hyphenated spelling the closed
    /// set uses (`text-encoder`, `diffusion-model`, `clip-vision`).
    fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Checkpoint => "checkpoint",
            ModelKind::Lora => "lora",
            ModelKind::Vae => "vae",
            ModelKind::ControlNet => "controlnet",
            ModelKind::Upscale => "upscale",
            ModelKind::TextEncoder => "text-encoder",
            ModelKind::DiffusionModel => "diffusion-model",
            ModelKind::ClipVision => "clip-vision",
            ModelKind::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl serde::Serialize for ModelKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ModelKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Runtime-constructed registry configuration. The parts of the system that
/// are genuinely variable across deployments: where the registry lives on
/// disk and which remote hosts it trusts.
#[derive(Clone)]
pub struct RegistryConfig {
    pub base_path: PathBuf,
    pub allowed_hosts: Vec<String>,
    pub idle_timeout: Duration,
}

impl RegistryConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            allowed_hosts: NetworkConfig::DEFAULT_ALLOWED_HOSTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            idle_timeout: NetworkConfig::IDLE_TIMEOUT,
        }
    }
}
