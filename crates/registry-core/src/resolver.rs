//! Pure classification of a workflow's dependency manifest against catalog
//! state. Never mutates the filesystem or catalog.

use crate::catalog::Catalog;
use crate::path_policy::PathPolicy;
use crate::types::{
    DependencyEntry, ExistingAction, ExistingEntry, MissingEntry, ResolutionReport,
};
use crate::Result;
use std::collections::HashMap;

pub struct DependencyResolver<'a> {
    catalog: &'a Catalog,
    path_policy: &'a PathPolicy,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(catalog: &'a Catalog, path_policy: &'a PathPolicy) -> Self {
        Self { catalog, path_policy }
    }

    /// Classifies every entry in `manifest` (a mapping from kind name to
    /// its dependency list) into `missing` or `existing`, and totals the
    /// bytes that would need to be downloaded vs. saved by deduplication.
    pub fn resolve(&self, manifest: &HashMap<String, Vec<DependencyEntry>>) -> Result<ResolutionReport> {
        let mut missing = Vec::new();
        let mut existing = Vec::new();
        let mut total_download_size = 0u64;
        let mut total_saved_size = 0u64;

        for entries in manifest.values() {
            for entry in entries {
                if let Some(artifact) = self.catalog.get_by_hash(&entry.sha256)? {
                    let dst_abs = self.path_policy.resolve(entry.kind, &entry.filename).ok();
                    let action = match dst_abs {
                        Some(ref dst) if *dst == artifact.canonical_path => ExistingAction::Canonical,
                        _ => ExistingAction::Symlink,
                    };
                    if action == ExistingAction::Symlink {
                        total_saved_size += entry.size;
                    }
                    existing.push(ExistingEntry {
                        filename: entry.filename.clone(),
                        exists_at: artifact.canonical_path,
                        kind: entry.kind,
                        sha256: entry.sha256.clone(),
                        size: entry.size,
                        action,
                    });
                    continue;
                }

                let dst_abs = self.path_policy.resolve(entry.kind, &entry.filename).ok();
                if let Some(dst_abs) = &dst_abs {
                    if dst_abs.exists() {
                        existing.push(ExistingEntry {
                            filename: entry.filename.clone(),
                            exists_at: dst_abs.clone(),
                            kind: entry.kind,
                            sha256: entry.sha256.clone(),
                            size: entry.size,
                            action: ExistingAction::Canonical,
                        });
                        continue;
                    }
                }

                total_download_size += entry.size;
                missing.push(MissingEntry {
                    kind: entry.kind,
                    filename: entry.filename.clone(),
                    sha256: entry.sha256.clone(),
                    size: entry.size,
                    urls: entry.urls.clone(),
                    requires_auth: entry.requires_auth,
                    auth_provider: entry.auth_provider,
                });
            }
        }

        Ok(ResolutionReport {
            missing,
            existing,
            total_download_size,
            total_saved_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::types::Artifact;
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(kind: ModelKind, filename: &str, sha: &str, size: u64) -> DependencyEntry {
        DependencyEntry {
            kind,
            filename: filename.into(),
            sha256: sha.into(),
            size,
            urls: vec!["https://huggingface.co/x".into()],
            display_name: None,
            required: None,
            requires_auth: false,
            auth_provider: None,
        }
    }

    #[test]
    fn mixed_manifest_splits_missing_and_existing() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let catalog = Catalog::open_in_memory().unwrap();
        let canonical = tmp.path().join("checkpoints/a.safetensors");
        std::fs::write(&canonical, b"hi").unwrap();
        catalog
            .insert_artifact(&Artifact {
                hash: "H1".into(),
                canonical_path: canonical,
                size_bytes: 2,
                source_url: None,
                metadata: serde_json::json!({}),
                added_at: Utc::now(),
            })
            .unwrap();

        let path_policy = PathPolicy::new(tmp.path());
        let resolver = DependencyResolver::new(&catalog, &path_policy);

        let mut manifest = HashMap::new();
        manifest.insert(
            "checkpoints".to_string(),
            vec![
                entry(ModelKind::Checkpoint, "b.safetensors", "H1", 2),
                entry(ModelKind::Checkpoint, "c.safetensors", "H2", 5),
            ],
        );

        let report = resolver.resolve(&manifest).unwrap();
        assert_eq!(report.existing.len(), 1);
        assert_eq!(report.existing[0].filename, "b.safetensors");
        assert_eq!(report.existing[0].action, ExistingAction::Symlink);
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].filename, "c.safetensors");
        assert_eq!(report.total_download_size, 5);
        assert_eq!(report.total_saved_size, 2);
    }

    #[test]
    fn destination_already_canonical_is_not_counted_as_saved() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("checkpoints")).unwrap();
        let canonical = tmp.path().join("checkpoints/a.safetensors");
        std::fs::write(&canonical, b"hi").unwrap();

        let catalog = Catalog::open_in_memory().unwrap();
        catalog
            .insert_artifact(&Artifact {
                hash: "H1".into(),
                canonical_path: canonical,
                size_bytes: 2,
                source_url: None,
                metadata: serde_json::json!({}),
                added_at: Utc::now(),
            })
            .unwrap();

        let path_policy = PathPolicy::new(tmp.path());
        let resolver = DependencyResolver::new(&catalog, &path_policy);
        let mut manifest = HashMap::new();
        manifest.insert(
            "checkpoints".to_string(),
            vec![entry(ModelKind::Checkpoint, "a.safetensors", "H1", 2)],
        );
        let report = resolver.resolve(&manifest).unwrap();
        assert_eq!(report.existing[0].action, ExistingAction::Canonical);
        assert_eq!(report.total_saved_size, 0);
    }
}
