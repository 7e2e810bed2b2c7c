//! Error types for the model registry.

use std::path::PathBuf;
use thiserror::Error;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// All failure modes the registry surfaces, one variant per error kind.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("url forbidden: {0}")]
    UrlForbidden(String),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("network timeout after {0:?}")]
    NetworkTimeout(std::time::Duration),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("disk full while writing {path}")]
    DiskFull { path: PathBuf },

    #[error("alias collision at {0}")]
    AliasCollision(PathBuf),

    #[error("download cancelled: no subscriber is listening for progress")]
    Cancelled,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl RegistryError {
    /// Attach a path to a bare `io::Error`, matching the convention every
    /// filesystem-touching call site in this crate uses so error messages
    /// always name the file involved.
    pub fn io_with_path(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::Other && is_disk_full(&source) {
            return RegistryError::DiskFull { path };
        }
        RegistryError::Io { path, source }
    }

    /// Whether a caller may usefully retry the operation that produced this
    /// error. Mirrors the Retriable? column of the error-kind table: only
    /// `Unauthorized` (with a fresh token) and `NetworkTimeout` are retriable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegistryError::Unauthorized(_) | RegistryError::NetworkTimeout(_)
        )
    }

    /// Maps this error to the HTTP status the surface layer returns for it.
    pub fn to_http_status(&self) -> u16 {
        match self {
            RegistryError::InvalidName(_) | RegistryError::UrlForbidden(_) => 400,
            RegistryError::Unauthorized(_) => 401,
            RegistryError::AliasCollision(_) => 409,
            RegistryError::CatalogUnavailable(_)
            | RegistryError::Io { .. }
            | RegistryError::Network(_)
            | RegistryError::Serde(_) => 500,
            RegistryError::NetworkTimeout(_)
            | RegistryError::HashMismatch { .. }
            | RegistryError::SizeMismatch { .. }
            | RegistryError::DiskFull { .. } => 500,
            // Never actually written to an HTTP response: by definition no
            // client is listening once this fires. Included only so every
            // variant has a status for logging/testing purposes.
            RegistryError::Cancelled => 499,
        }
    }
}

fn is_disk_full(err: &std::io::Error) -> bool {
    // ENOSPC on unix, ERROR_DISK_FULL on windows; raw_os_error is the
    // portable way to check without pulling in a platform-specific crate
    // just for this one comparison.
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(28)
    }
    #[cfg(windows)]
    {
        err.raw_os_error() == Some(112)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = err;
        false
    }
}

impl From<rusqlite::Error> for RegistryError {
    fn from(source: rusqlite::Error) -> Self {
        RegistryError::CatalogUnavailable(source.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_match_error_table() {
        assert!(RegistryError::Unauthorized("x".into()).is_retryable());
        assert!(RegistryError::NetworkTimeout(std::time::Duration::from_secs(1)).is_retryable());
        assert!(!RegistryError::InvalidName("x".into()).is_retryable());
        assert!(!RegistryError::HashMismatch {
            expected: "a".into(),
            actual: "b".into()
        }
        .is_retryable());
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(RegistryError::InvalidName("x".into()).to_http_status(), 400);
        assert_eq!(RegistryError::UrlForbidden("x".into()).to_http_status(), 400);
        assert_eq!(RegistryError::Unauthorized("x".into()).to_http_status(), 401);
        assert_eq!(
            RegistryError::AliasCollision(PathBuf::from("/x")).to_http_status(),
            409
        );
    }
}
