//! One-shot ingestion of a pre-existing model tree into the catalog.

use crate::catalog::Catalog;
use crate::config::{ModelKind, ALLOWED_EXTENSIONS};
use crate::error::Result;
use crate::path_policy::PathPolicy;
use crate::types::{Alias, Artifact, MigrationSummary};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Read;
use tracing::{debug, info};
use walkdir::WalkDir;

pub struct MigrationPass<'a> {
    catalog: &'a Catalog,
    path_policy: &'a PathPolicy,
}

impl<'a> MigrationPass<'a> {
    pub fn new(catalog: &'a Catalog, path_policy: &'a PathPolicy) -> Self {
        Self { catalog, path_policy }
    }

    /// Walks `kind`'s directory (or every kind if `None`), hashes each file
    /// with an allowed extension, and upserts it into the catalog. A hash
    /// that already has a different canonical path becomes an alias rather
    /// than a duplicate artifact. `dry_run` reports planned changes without
    /// writing to the catalog.
    pub fn run(&self, kind: Option<ModelKind>, dry_run: bool) -> Result<MigrationSummary> {
        let mut summary = MigrationSummary {
            dry_run,
            ..Default::default()
        };

        let kinds: Vec<ModelKind> = match kind {
            Some(k) => vec![k],
            None => ModelKind::all_kinds().collect(),
        };

        // Dry runs never write to the catalog, so a hash seen twice within
        // the same pass won't show up via `get_by_hash` the second time
        // around; track it here instead.
        let mut seen_in_this_pass: HashSet<String> = HashSet::new();

        for kind in kinds {
            let dir = self.path_policy.kind_dir(kind);
            if !dir.exists() {
                continue;
            }
            for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path();
                let has_allowed_extension = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false);
                if !has_allowed_extension {
                    continue;
                }

                match self.ingest_one(path, dry_run, &mut seen_in_this_pass) {
                    Ok(IngestOutcome::NewArtifact(size)) => {
                        summary.new_artifacts += 1;
                        summary.bytes_hashed += size;
                    }
                    Ok(IngestOutcome::NewAlias(size)) => {
                        summary.new_aliases += 1;
                        summary.bytes_hashed += size;
                    }
                    Ok(IngestOutcome::AlreadyCataloged) => {}
                    Err(e) => {
                        summary.errors.push(format!("{}: {e}", path.display()));
                    }
                }
            }
        }

        info!(
            new_artifacts = summary.new_artifacts,
            new_aliases = summary.new_aliases,
            bytes_hashed = summary.bytes_hashed,
            errors = summary.errors.len(),
            dry_run,
            "migration pass complete"
        );
        Ok(summary)
    }

    fn ingest_one(
        &self,
        path: &std::path::Path,
        dry_run: bool,
        seen_in_this_pass: &mut HashSet<String>,
    ) -> Result<IngestOutcome> {
        if self.catalog.get_by_path(path)?.is_some() {
            return Ok(IngestOutcome::AlreadyCataloged);
        }

        let mut file = std::fs::File::open(path)
            .map_err(|e| crate::error::RegistryError::io_with_path(e, path))?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 1024 * 1024];
        let mut size = 0u64;
        loop {
            let n = file
                .read(&mut buf)
                .map_err(|e| crate::error::RegistryError::io_with_path(e, path))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        let hash_hex = hex::encode(hasher.finalize());
        debug!(path = %path.display(), hash = %hash_hex, "migration hashed file");

        if dry_run {
            if self.catalog.get_by_hash(&hash_hex)?.is_some() || seen_in_this_pass.contains(&hash_hex) {
                return Ok(IngestOutcome::NewAlias(size));
            }
            seen_in_this_pass.insert(hash_hex);
            return Ok(IngestOutcome::NewArtifact(size));
        }

        match self.catalog.get_by_hash(&hash_hex)? {
            Some(existing) if existing.canonical_path != path => {
                self.catalog.insert_alias(&Alias {
                    hash: hash_hex,
                    alias_path: path.to_path_buf(),
                    created_at: Utc::now(),
                })?;
                Ok(IngestOutcome::NewAlias(size))
            }
            Some(_) => Ok(IngestOutcome::AlreadyCataloged),
            None => {
                self.catalog.insert_artifact(&Artifact {
                    hash: hash_hex,
                    canonical_path: path.to_path_buf(),
                    size_bytes: size,
                    source_url: None,
                    metadata: serde_json::json!({}),
                    added_at: Utc::now(),
                })?;
                Ok(IngestOutcome::NewArtifact(size))
            }
        }
    }
}

enum IngestOutcome {
    NewArtifact(u64),
    NewAlias(u64),
    AlreadyCataloged,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_new_files_and_detects_duplicates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let checkpoints = tmp.path().join("checkpoints");
        std::fs::create_dir_all(&checkpoints).unwrap();
        std::fs::write(checkpoints.join("a.safetensors"), b"same-bytes").unwrap();
        std::fs::write(checkpoints.join("b.safetensors"), b"same-bytes").unwrap();
        std::fs::write(checkpoints.join("c.safetensors"), b"different").unwrap();
        std::fs::write(checkpoints.join("ignore.txt"), b"not a model").unwrap();

        let catalog = Catalog::open_in_memory().unwrap();
        let path_policy = PathPolicy::new(tmp.path());
        let pass = MigrationPass::new(&catalog, &path_policy);

        let summary = pass.run(Some(crate::config::ModelKind::Checkpoint), false).unwrap();
        assert_eq!(summary.new_artifacts, 2);
        assert_eq!(summary.new_aliases, 1);
        assert!(summary.errors.is_empty());
        assert_eq!(catalog.stats().unwrap().artifact_count, 2);
    }

    #[test]
    fn dry_run_does_not_write_to_catalog() {
        let tmp = tempfile::TempDir::new().unwrap();
        let checkpoints = tmp.path().join("checkpoints");
        std::fs::create_dir_all(&checkpoints).unwrap();
        std::fs::write(checkpoints.join("a.safetensors"), b"data").unwrap();

        let catalog = Catalog::open_in_memory().unwrap();
        let path_policy = PathPolicy::new(tmp.path());
        let pass = MigrationPass::new(&catalog, &path_policy);

        let summary = pass.run(Some(crate::config::ModelKind::Checkpoint), true).unwrap();
        assert_eq!(summary.new_artifacts, 1);
        assert_eq!(catalog.stats().unwrap().artifact_count, 0);
    }

    #[test]
    fn dry_run_detects_duplicates_within_the_same_batch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let checkpoints = tmp.path().join("checkpoints");
        std::fs::create_dir_all(&checkpoints).unwrap();
        std::fs::write(checkpoints.join("a.safetensors"), b"same-bytes").unwrap();
        std::fs::write(checkpoints.join("b.safetensors"), b"same-bytes").unwrap();

        let catalog = Catalog::open_in_memory().unwrap();
        let path_policy = PathPolicy::new(tmp.path());
        let pass = MigrationPass::new(&catalog, &path_policy);

        let summary = pass.run(Some(crate::config::ModelKind::Checkpoint), true).unwrap();
        assert_eq!(summary.new_artifacts, 1);
        assert_eq!(summary.new_aliases, 1);
        assert_eq!(catalog.stats().unwrap().artifact_count, 0);
    }
}
