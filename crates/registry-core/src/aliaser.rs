//! Materializes filesystem aliases: symlink, falling back to hardlink,
//! falling back to a byte copy.

use crate::catalog::Catalog;
use crate::error::{RegistryError, Result};
use crate::types::{Alias, LinkType};
use chrono::Utc;
use std::path::Path;
use tracing::warn;

pub struct Aliaser<'a> {
    catalog: &'a Catalog,
}

impl<'a> Aliaser<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Creates `alias_path -> canonical_path` and records the alias row.
    /// `alias_path` must not already exist; a genuine collision is reported
    /// as `AliasCollision` rather than silently overwritten or renamed.
    pub fn create_alias(&self, hash: &str, canonical_path: &Path, alias_path: &Path) -> Result<LinkType> {
        if alias_path.exists() {
            return Err(RegistryError::AliasCollision(alias_path.to_path_buf()));
        }
        if let Some(parent) = alias_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::io_with_path(e, parent))?;
        }
        let link_type = create_symlink_or_copy(canonical_path, alias_path)?;
        self.catalog.insert_alias(&Alias {
            hash: hash.to_string(),
            alias_path: alias_path.to_path_buf(),
            created_at: Utc::now(),
        })?;
        Ok(link_type)
    }
}

/// Fallback chain: symlink, then hardlink, then copy. Grounded in the
/// filesystem-dialect differences every platform imposes — a privilege-
/// restricted Windows host or a cross-filesystem hardlink both fail
/// silently enough that the only reliable signal is "did the call
/// succeed," so each tier is attempted in order rather than branching on
/// platform alone.
fn create_symlink_or_copy(source: &Path, target: &Path) -> Result<LinkType> {
    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(source, target).is_ok() {
            return Ok(LinkType::Symlink);
        }
    }
    #[cfg(windows)]
    {
        if std::os::windows::fs::symlink_file(source, target).is_ok() {
            return Ok(LinkType::Symlink);
        }
    }

    if std::fs::hard_link(source, target).is_ok() {
        warn!(
            source = %source.display(),
            target = %target.display(),
            "symlink unavailable, used hardlink"
        );
        return Ok(LinkType::Hardlink);
    }

    warn!(
        source = %source.display(),
        target = %target.display(),
        "symlink and hardlink unavailable, falling back to copy"
    );
    std::fs::copy(source, target).map_err(|e| RegistryError::io_with_path(e, target))?;
    Ok(LinkType::Copy)
}
