//! Content-addressed model registry and streaming download engine.
//!
//! Dependency order, leaves first: [`path_policy`] and [`config`] are used
//! by everything above them; [`catalog`] is the durable store; [`aliaser`],
//! [`url_admission`], and [`credentials`] are narrow single-purpose
//! collaborators the [`download`] engine composes; [`resolver`] and
//! [`migration`] are read-mostly operations layered on top of the catalog.

pub mod aliaser;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod download;
pub mod error;
pub mod migration;
pub mod path_policy;
pub mod resolver;
pub mod types;
pub mod url_admission;

pub use error::{RegistryError, Result};

use config::RegistryConfig;
use std::sync::Arc;
use tracing::info;

/// Top-level facade wiring the catalog, path policy, and download engine
/// together for a single `base_path`. `registry-server` constructs one of
/// these at startup and shares it across requests behind an `Arc`.
pub struct Registry {
    pub config: RegistryConfig,
    pub catalog: Arc<catalog::Catalog>,
    pub path_policy: path_policy::PathPolicy,
    pub download_engine: Arc<download::DownloadEngine>,
}

impl Registry {
    /// Opens (or creates) the catalog under `config.base_path` and wires up
    /// the rest of the registry's components.
    pub fn open(config: RegistryConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.base_path)
            .map_err(|e| RegistryError::io_with_path(e, &config.base_path))?;
        for kind in config::ModelKind::all_kinds() {
            let dir = config.base_path.join(kind.folder_name());
            std::fs::create_dir_all(&dir).map_err(|e| RegistryError::io_with_path(e, &dir))?;
        }

        let catalog_path = config::PathsConfig::catalog_path(&config.base_path);
        let catalog = Arc::new(catalog::Catalog::open(&catalog_path)?);
        let path_policy = path_policy::PathPolicy::new(&config.base_path);
        let admission = url_admission::UrlAdmission::new(config.allowed_hosts.clone());
        let download_engine = Arc::new(download::DownloadEngine::new(
            path_policy.clone(),
            admission,
            catalog.clone(),
            config.idle_timeout,
        ));

        info!(base_path = %config.base_path.display(), "registry opened");
        Ok(Self {
            config,
            catalog,
            path_policy,
            download_engine,
        })
    }

    pub fn resolver(&self) -> resolver::DependencyResolver<'_> {
        resolver::DependencyResolver::new(&self.catalog, &self.path_policy)
    }

    pub fn migration_pass(&self) -> migration::MigrationPass<'_> {
        migration::MigrationPass::new(&self.catalog, &self.path_policy)
    }
}
