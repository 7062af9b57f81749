//! Feature Registry for RideScore
//!
//! Two halves live here:
//! - **SchemaRegistrar** validates entity and feature view declarations and
//!   produces a `RegistrySnapshot`
//! - **FeatureRegistry** persists snapshots (SQLite with WAL) so that the
//!   scoring service can load them at startup
//!
//! # Examples
//!
//! ```rust,ignore
//! use ridescore_registry::{FeatureRegistry, RegistryConfig, RepoDefinition};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registrar = RepoDefinition::load("demos/driver_repo.yaml")?.into_registrar()?;
//!
//!     let registry = FeatureRegistry::new(RegistryConfig::sqlite("data/registry.db")).await?;
//!     registry.apply(&registrar).await?;
//!
//!     let snapshot = registry.load_snapshot().await?;
//!     assert!(snapshot.feature_view("driver_stats").is_some());
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use chrono::{DateTime, Utc};
use ridescore_core::{FeatureView, RegistrySnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

pub mod backend;
pub use backend::{RegistryBackend, RegistryConfig};

mod registrar;
mod repo;
mod schema;
mod sqlite_backend;

pub use registrar::SchemaRegistrar;
pub use repo::{FeatureViewDef, RepoDefinition, SourceDef, TtlSpec};
pub use sqlite_backend::SqliteBackend;

/// One application of a snapshot to the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyRecord {
    pub id: i64,
    pub project: String,
    pub entity_count: i64,
    pub feature_view_count: i64,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub applied_at: DateTime<Utc>,
}

/// Feature Registry with pluggable backend
pub struct FeatureRegistry {
    backend: Arc<dyn RegistryBackend>,
}

impl FeatureRegistry {
    /// Create new registry with specified backend configuration
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let registry = FeatureRegistry::new(RegistryConfig::sqlite("./registry.db")).await?;
    /// ```
    pub async fn new(config: RegistryConfig) -> Result<Self> {
        let backend: Arc<dyn RegistryBackend> = match config {
            RegistryConfig::SQLite { path } => Arc::new(SqliteBackend::new(&path)?),
        };

        backend.init_schema().await?;

        Ok(Self { backend })
    }

    /// Open a registry from a location string (`sqlite://path`, a path or `:memory:`)
    pub async fn open(location: &str) -> Result<Self> {
        Self::new(RegistryConfig::from_location(location)?).await
    }

    /// Open a registry that must already exist (`sqlite://path`, a path or `:memory:`)
    ///
    /// Readers use this so a mistyped location fails without leaving an empty
    /// database behind.
    pub async fn open_existing(location: &str) -> Result<Self> {
        let backend: Arc<dyn RegistryBackend> = match RegistryConfig::from_location(location)? {
            RegistryConfig::SQLite { path } => Arc::new(SqliteBackend::open_existing(&path)?),
        };

        backend.init_schema().await?;

        Ok(Self { backend })
    }

    /// Create in-memory registry (for testing)
    pub async fn in_memory() -> Result<Self> {
        let backend = SqliteBackend::in_memory()?;
        let registry = Self {
            backend: Arc::new(backend),
        };

        registry.backend.init_schema().await?;

        Ok(registry)
    }

    /// Persist the registrar's declarations, replacing what was stored before
    pub async fn apply(&self, registrar: &SchemaRegistrar) -> Result<ApplyRecord> {
        self.backend.apply(registrar.snapshot()).await
    }

    /// Load the stored snapshot without re-validating it
    pub async fn load_snapshot(&self) -> Result<RegistrySnapshot> {
        self.backend.load_snapshot().await
    }

    /// Load the stored snapshot and re-validate it through a registrar
    pub async fn load_registrar(&self) -> Result<SchemaRegistrar> {
        let snapshot = self.backend.load_snapshot().await?;
        let registrar = SchemaRegistrar::from_snapshot(snapshot)?;
        info!(
            project = %registrar.project(),
            feature_views = registrar.snapshot().feature_views.len(),
            "Loaded feature registry"
        );
        Ok(registrar)
    }

    /// Get feature view by name
    pub async fn get_feature_view(&self, name: &str) -> Result<FeatureView> {
        self.backend.get_feature_view(name).await
    }

    /// List all feature views (with optional filter)
    pub async fn list_feature_views(&self, filter: Option<&str>) -> Result<Vec<FeatureView>> {
        self.backend.list_feature_views(filter).await
    }

    pub async fn last_apply(&self) -> Result<Option<ApplyRecord>> {
        self.backend.last_apply().await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.backend.health_check().await
    }
}
