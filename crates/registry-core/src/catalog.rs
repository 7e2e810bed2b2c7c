//! Durable, hash-indexed artifact catalog backed by SQLite.
//!
//! Single-writer/multi-reader discipline: one `Mutex<Connection>` serializes
//! writers; WAL mode lets concurrent readers proceed without blocking on
//! an in-progress write transaction.

use crate::error::{RegistryError, Result};
use crate::types::{Alias, Artifact};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

pub struct Stats {
    pub artifact_count: u64,
    pub alias_count: u64,
    pub total_bytes: u64,
}

/// The catalog store: durable `artifacts` and `aliases` relations.
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Opens (creating if absent) the catalog at `path`, configures the
    /// connection, and ensures the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RegistryError::io_with_path(e, parent))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| RegistryError::CatalogUnavailable(e.to_string()))?;
        configure_connection(&conn)?;
        ensure_schema(&conn)?;
        info!(path = %path.display(), "catalog opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory catalog, used by tests that don't need
    /// persistence across process restarts.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RegistryError::CatalogUnavailable(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::CatalogUnavailable("catalog lock poisoned".into()))
    }

    /// Inserts a new artifact row. A no-op if the hash already exists
    /// (idempotent per the Catalog Store contract).
    pub fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO artifacts (hash, canonical_path, size_bytes, source_url, metadata, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(hash) DO NOTHING",
            params![
                artifact.hash,
                artifact.canonical_path.to_string_lossy(),
                artifact.size_bytes,
                artifact.source_url,
                artifact.metadata.to_string(),
                artifact.added_at.to_rfc3339(),
            ],
        )?;
        debug!(hash = %artifact.hash, "artifact row inserted (or already present)");
        Ok(())
    }

    /// Inserts a new alias row. A no-op if `(hash, alias_path)` already
    /// exists. Rejects an alias path that collides with any canonical path,
    /// the fourth global invariant from the data model.
    pub fn insert_alias(&self, alias: &Alias) -> Result<()> {
        let conn = self.lock()?;
        let collides_with_canonical: Option<String> = conn
            .query_row(
                "SELECT canonical_path FROM artifacts WHERE canonical_path = ?1",
                params![alias.alias_path.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()?;
        if collides_with_canonical.is_some() {
            return Err(RegistryError::AliasCollision(alias.alias_path.clone()));
        }
        conn.execute(
            "INSERT INTO aliases (hash, alias_path, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(alias_path) DO NOTHING",
            params![
                alias.hash,
                alias.alias_path.to_string_lossy(),
                alias.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_by_hash(&self, hash: &str) -> Result<Option<Artifact>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT hash, canonical_path, size_bytes, source_url, metadata, added_at
             FROM artifacts WHERE hash = ?1",
            params![hash],
            row_to_artifact,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Looks up a path against both relations, returning the artifact it
    /// resolves to and whether the path is the canonical one.
    pub fn get_by_path(&self, abs_path: &Path) -> Result<Option<(Artifact, bool)>> {
        let conn = self.lock()?;
        let path_str = abs_path.to_string_lossy();
        if let Some(artifact) = conn
            .query_row(
                "SELECT hash, canonical_path, size_bytes, source_url, metadata, added_at
                 FROM artifacts WHERE canonical_path = ?1",
                params![path_str],
                row_to_artifact,
            )
            .optional()?
        {
            return Ok(Some((artifact, true)));
        }
        let hash: Option<String> = conn
            .query_row(
                "SELECT hash FROM aliases WHERE alias_path = ?1",
                params![path_str],
                |row| row.get(0),
            )
            .optional()?;
        let Some(hash) = hash else {
            return Ok(None);
        };
        let artifact = conn
            .query_row(
                "SELECT hash, canonical_path, size_bytes, source_url, metadata, added_at
                 FROM artifacts WHERE hash = ?1",
                params![hash],
                row_to_artifact,
            )
            .optional()?;
        Ok(artifact.map(|a| (a, false)))
    }

    pub fn list_artifacts(&self) -> Result<Vec<Artifact>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT hash, canonical_path, size_bytes, source_url, metadata, added_at FROM artifacts",
        )?;
        let rows = stmt
            .query_map([], row_to_artifact)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_aliases_for(&self, hash: &str) -> Result<Vec<Alias>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT hash, alias_path, created_at FROM aliases WHERE hash = ?1")?;
        let rows = stmt
            .query_map(params![hash], row_to_alias)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<Stats> {
        let conn = self.lock()?;
        let artifact_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM artifacts", [], |r| r.get(0))?;
        let alias_count: u64 = conn.query_row("SELECT COUNT(*) FROM aliases", [], |r| r.get(0))?;
        let total_bytes: u64 = conn
            .query_row("SELECT COALESCE(SUM(size_bytes), 0) FROM artifacts", [], |r| {
                r.get(0)
            })?;
        Ok(Stats {
            artifact_count,
            alias_count,
            total_bytes,
        })
    }
}

fn row_to_artifact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
    let canonical_path: String = row.get(1)?;
    let metadata_raw: String = row.get(4)?;
    let added_at: String = row.get(5)?;
    Ok(Artifact {
        hash: row.get(0)?,
        canonical_path: PathBuf::from(canonical_path),
        size_bytes: row.get(2)?,
        source_url: row.get(3)?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
        added_at: chrono::DateTime::parse_from_rfc3339(&added_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_alias(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alias> {
    let alias_path: String = row.get(1)?;
    let created_at: String = row.get(2)?;
    Ok(Alias {
        hash: row.get(0)?,
        alias_path: PathBuf::from(alias_path),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS artifacts (
            hash TEXT PRIMARY KEY,
            canonical_path TEXT NOT NULL UNIQUE,
            size_bytes INTEGER NOT NULL,
            source_url TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            added_at TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS aliases (
            hash TEXT NOT NULL REFERENCES artifacts(hash),
            alias_path TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (hash, alias_path)
         );
         CREATE INDEX IF NOT EXISTS idx_aliases_hash ON aliases(hash);",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_artifact(hash: &str, path: &str) -> Artifact {
        Artifact {
            hash: hash.into(),
            canonical_path: PathBuf::from(path),
            size_bytes: 10,
            source_url: Some("https://huggingface.co/foo".into()),
            metadata: serde_json::json!({}),
            added_at: Utc::now(),
        }
    }

    #[test]
    fn insert_and_get_by_hash_round_trips() {
        let catalog = Catalog::open_in_memory().unwrap();
        let artifact = sample_artifact("abc123", "/base/checkpoints/model.safetensors");
        catalog.insert_artifact(&artifact).unwrap();
        let fetched = catalog.get_by_hash("abc123").unwrap().unwrap();
        assert_eq!(fetched.hash, "abc123");
        assert_eq!(fetched.size_bytes, 10);
    }

    #[test]
    fn duplicate_hash_insert_is_idempotent() {
        let catalog = Catalog::open_in_memory().unwrap();
        let artifact = sample_artifact("abc123", "/base/checkpoints/model.safetensors");
        catalog.insert_artifact(&artifact).unwrap();
        catalog.insert_artifact(&artifact).unwrap();
        assert_eq!(catalog.stats().unwrap().artifact_count, 1);
    }

    #[test]
    fn alias_colliding_with_canonical_path_is_rejected() {
        let catalog = Catalog::open_in_memory().unwrap();
        let artifact = sample_artifact("abc123", "/base/checkpoints/model.safetensors");
        catalog.insert_artifact(&artifact).unwrap();
        let alias = Alias {
            hash: "abc123".into(),
            alias_path: PathBuf::from("/base/checkpoints/model.safetensors"),
            created_at: Utc::now(),
        };
        assert!(catalog.insert_alias(&alias).is_err());
    }

    #[test]
    fn get_by_path_resolves_alias_to_its_artifact() {
        let catalog = Catalog::open_in_memory().unwrap();
        let artifact = sample_artifact("abc123", "/base/checkpoints/model.safetensors");
        catalog.insert_artifact(&artifact).unwrap();
        let alias = Alias {
            hash: "abc123".into(),
            alias_path: PathBuf::from("/base/checkpoints/alt.safetensors"),
            created_at: Utc::now(),
        };
        catalog.insert_alias(&alias).unwrap();

        let (found, is_canonical) = catalog
            .get_by_path(Path::new("/base/checkpoints/alt.safetensors"))
            .unwrap()
            .unwrap();
        assert_eq!(found.hash, "abc123");
        assert!(!is_canonical);
    }

    #[test]
    fn list_aliases_for_empty_hash_is_empty() {
        let catalog = Catalog::open_in_memory().unwrap();
        assert!(catalog.list_aliases_for("nohash").unwrap().is_empty());
    }
}
