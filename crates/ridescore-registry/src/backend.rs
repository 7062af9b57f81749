//! Registry backend trait and configuration

use crate::ApplyRecord;
use anyhow::{bail, Result};
use async_trait::async_trait;
use ridescore_core::{FeatureView, RegistrySnapshot};

/// Registry backend trait for storage operations
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Initialize schema (create tables, indexes)
    async fn init_schema(&self) -> Result<()>;

    /// Replace the stored declarations with `snapshot`, atomically
    async fn apply(&self, snapshot: &RegistrySnapshot) -> Result<ApplyRecord>;

    /// Read back every stored declaration
    async fn load_snapshot(&self) -> Result<RegistrySnapshot>;

    /// Get feature view by name
    async fn get_feature_view(&self, name: &str) -> Result<FeatureView>;

    /// List feature views (with optional name filter)
    async fn list_feature_views(&self, filter: Option<&str>) -> Result<Vec<FeatureView>>;

    /// Most recent snapshot application, if any
    async fn last_apply(&self) -> Result<Option<ApplyRecord>>;

    async fn health_check(&self) -> Result<()>;
}

/// Configuration for registry backend
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryConfig {
    /// SQLite with WAL mode (embedded, multi-process safe)
    SQLite {
        /// Path to SQLite database file, or `:memory:`
        path: String,
    },
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::SQLite {
            path: "data/registry.db".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Create SQLite configuration
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::SQLite { path: path.into() }
    }

    /// Parse a registry location
    ///
    /// Accepts `sqlite://<path>`, `sqlite::memory:`, `:memory:` or a bare
    /// file path.
    pub fn from_location(location: &str) -> Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            bail!("Registry location must not be empty");
        }

        if location == "sqlite::memory:" {
            return Ok(Self::sqlite(":memory:"));
        }

        if let Some(path) = location.strip_prefix("sqlite://") {
            if path.is_empty() {
                bail!("Registry location '{}' has no path", location);
            }
            return Ok(Self::sqlite(path));
        }

        if let Some((scheme, _)) = location.split_once("://") {
            bail!("Unsupported registry scheme '{}'", scheme);
        }

        Ok(Self::sqlite(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_location() {
        assert_eq!(
            RegistryConfig::from_location("sqlite://data/registry.db").unwrap(),
            RegistryConfig::sqlite("data/registry.db")
        );
        assert_eq!(
            RegistryConfig::from_location("/var/lib/ridescore/registry.db").unwrap(),
            RegistryConfig::sqlite("/var/lib/ridescore/registry.db")
        );
        assert_eq!(
            RegistryConfig::from_location(":memory:").unwrap(),
            RegistryConfig::sqlite(":memory:")
        );
        assert_eq!(
            RegistryConfig::from_location("sqlite::memory:").unwrap(),
            RegistryConfig::sqlite(":memory:")
        );
    }

    #[test]
    fn test_from_location_rejects_bad_input() {
        assert!(RegistryConfig::from_location("").is_err());
        assert!(RegistryConfig::from_location("sqlite://").is_err());
        assert!(RegistryConfig::from_location("s3://bucket/registry.db").is_err());
    }
}
