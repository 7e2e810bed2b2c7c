//! Maps a model kind to its destination directory and validates filenames.

use crate::config::{ModelKind, ALLOWED_EXTENSIONS};
use crate::error::{RegistryError, Result};
use std::path::{Path, PathBuf};

/// Resolves `(kind, filename)` pairs to absolute, validated destination
/// paths rooted under a configured base directory.
#[derive(Clone)]
pub struct PathPolicy {
    base: PathBuf,
}

impl PathPolicy {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn kind_dir(&self, kind: ModelKind) -> PathBuf {
        self.base.join(kind.folder_name())
    }

    /// Validates `filename` is a single path segment with an allowed
    /// extension and resolves it to an absolute path under `kind`'s
    /// directory, guaranteeing the result is a descendant of the base
    /// directory even once symlinks are taken into account.
    pub fn resolve(&self, kind: ModelKind, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        let dir = self.kind_dir(kind);
        let candidate = dir.join(filename);
        self.assert_descendant(&candidate)?;
        Ok(candidate)
    }

    /// Confirms a path, once canonicalized as far as its existing ancestors
    /// allow, still falls under the base directory. Used both by `resolve`
    /// (on a not-yet-existing candidate) and by callers re-checking a path
    /// read back from the catalog.
    fn assert_descendant(&self, candidate: &Path) -> Result<()> {
        let base_canon = canonicalize_existing_prefix(&self.base)?;
        let candidate_canon = canonicalize_existing_prefix(candidate)?;
        if !candidate_canon.starts_with(&base_canon) {
            return Err(RegistryError::InvalidName(format!(
                "{} escapes base directory {}",
                candidate.display(),
                self.base.display()
            )));
        }
        Ok(())
    }
}

/// Validates filename rules from the Path Policy contract: a single path
/// segment, no traversal, no leading dot, an allowed extension.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(RegistryError::InvalidName("empty filename".into()));
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(RegistryError::InvalidName(format!(
            "{filename} is not a single path segment"
        )));
    }
    if filename == "." || filename == ".." || filename.starts_with('.') {
        return Err(RegistryError::InvalidName(format!(
            "{filename} has a disallowed leading dot"
        )));
    }
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(RegistryError::InvalidName(format!(
            "{filename} has a disallowed extension"
        ))),
    }
}

/// Canonicalizes the longest existing prefix of `path`, then re-appends the
/// remaining (not-yet-created) components. This lets Path Policy reject
/// traversal on a destination that doesn't exist yet, which
/// `Path::canonicalize` alone cannot do since it requires every component
/// to exist.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(canon) => {
                let mut result = canon;
                for component in tail.into_iter().rev() {
                    result.push(component);
                }
                return Ok(result);
            }
            Err(_) => {
                let Some(parent) = existing.parent() else {
                    return Err(RegistryError::io_with_path(
                        std::io::Error::new(std::io::ErrorKind::NotFound, "no existing ancestor"),
                        path,
                    ));
                };
                if let Some(name) = existing.file_name() {
                    tail.push(name.to_os_string());
                }
                existing = parent;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_traversal() {
        assert!(validate_filename("../escape.safetensors").is_err());
        assert!(validate_filename("a/b.safetensors").is_err());
    }

    #[test]
    fn rejects_disallowed_extension() {
        assert!(validate_filename("model.exe").is_err());
    }

    #[test]
    fn rejects_leading_dot() {
        assert!(validate_filename(".hidden.safetensors").is_err());
    }

    #[test]
    fn accepts_well_formed_name() {
        assert!(validate_filename("model.safetensors").is_ok());
        assert!(validate_filename("weights.gguf").is_ok());
    }

    #[test]
    fn resolve_stays_under_base() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let policy = PathPolicy::new(tmp.path());
        let resolved = policy.resolve(ModelKind::Checkpoint, "model.safetensors").unwrap();
        assert!(resolved.starts_with(tmp.path().canonicalize().unwrap()));
    }
}
