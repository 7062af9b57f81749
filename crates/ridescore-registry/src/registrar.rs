//! Schema Registrar
//!
//! Validates entity and feature view declarations and accumulates them into a
//! `RegistrySnapshot`. Registration is idempotent: declaring the same object
//! twice is a no-op, declaring a different object under an existing name is a
//! configuration error.
//!
//! Entities must be registered before the feature views that reference them.

use ridescore_core::{Entity, Error, FeatureRef, FeatureView, RegistrySnapshot, Result};
use std::collections::HashSet;
use tracing::debug;

/// Accumulates validated declarations
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistrar {
    snapshot: RegistrySnapshot,
}

impl SchemaRegistrar {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            snapshot: RegistrySnapshot::new(project),
        }
    }

    /// Rebuild a registrar from a persisted snapshot, re-validating every object
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Result<Self> {
        let mut registrar = Self::new(snapshot.project.clone());
        for entity in snapshot.entities.into_values() {
            registrar.register_entity(entity)?;
        }
        for view in snapshot.feature_views.into_values() {
            registrar.register_feature_view(view)?;
        }
        Ok(registrar)
    }

    pub fn project(&self) -> &str {
        &self.snapshot.project
    }

    /// Register an entity
    ///
    /// # Errors
    ///
    /// `Configuration` when the name or join key is empty, or when a different
    /// entity is already registered under the same name.
    pub fn register_entity(&mut self, entity: Entity) -> Result<()> {
        if entity.name.trim().is_empty() {
            return Err(Error::config("entity name must not be empty"));
        }
        if entity.join_key().trim().is_empty() {
            return Err(Error::config(format!(
                "entity '{}' has an empty join key",
                entity.name
            )));
        }

        if let Some(existing) = self.snapshot.entities.get(&entity.name) {
            if existing == &entity {
                return Ok(());
            }
            return Err(Error::config(format!(
                "entity '{}' is already registered with a different definition",
                entity.name
            )));
        }

        debug!(entity = %entity.name, join_key = %entity.join_key(), "Registered entity");
        self.snapshot.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    /// Register a feature view
    ///
    /// # Errors
    ///
    /// `Configuration` when:
    /// - the name is empty or already taken by a different view
    /// - it references no entity, or an entity that is not registered
    /// - it declares no features, an unnamed feature or a duplicate feature
    /// - the source has no table or no event timestamp column
    /// - the ttl is negative
    ///
    /// A blank `created_timestamp_column` is stored as absent.
    pub fn register_feature_view(&mut self, mut view: FeatureView) -> Result<()> {
        self.validate_feature_view(&view)?;

        if view
            .source
            .created_timestamp_column
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            view.source.created_timestamp_column = None;
        }

        if let Some(existing) = self.snapshot.feature_views.get(&view.name) {
            if existing == &view {
                return Ok(());
            }
            return Err(Error::config(format!(
                "feature view '{}' is already registered with a different definition",
                view.name
            )));
        }

        debug!(
            feature_view = %view.name,
            features = view.features.len(),
            ttl_seconds = view.ttl_seconds,
            "Registered feature view"
        );
        self.snapshot.feature_views.insert(view.name.clone(), view);
        Ok(())
    }

    fn validate_feature_view(&self, view: &FeatureView) -> Result<()> {
        if view.name.trim().is_empty() {
            return Err(Error::config("feature view name must not be empty"));
        }
        if view.name.contains(':') {
            return Err(Error::config(format!(
                "feature view name '{}' must not contain ':'",
                view.name
            )));
        }

        if view.entities.is_empty() {
            return Err(Error::config(format!(
                "feature view '{}' must reference at least one entity",
                view.name
            )));
        }
        for entity in &view.entities {
            if !self.snapshot.entities.contains_key(entity) {
                return Err(Error::config(format!(
                    "feature view '{}' references unregistered entity '{}'",
                    view.name, entity
                )));
            }
        }

        if view.features.is_empty() {
            return Err(Error::config(format!(
                "feature view '{}' must declare at least one feature",
                view.name
            )));
        }
        let mut seen = HashSet::new();
        for feature in &view.features {
            if feature.name.trim().is_empty() || feature.name.contains(':') {
                return Err(Error::config(format!(
                    "feature view '{}' declares an invalid feature name '{}'",
                    view.name, feature.name
                )));
            }
            if !seen.insert(feature.name.as_str()) {
                return Err(Error::config(format!(
                    "feature view '{}' declares feature '{}' more than once",
                    view.name, feature.name
                )));
            }
        }

        if view.source.table_ref.trim().is_empty() {
            return Err(Error::config(format!(
                "feature view '{}' has a source without a table",
                view.name
            )));
        }
        if view.source.event_timestamp_column.trim().is_empty() {
            return Err(Error::config(format!(
                "feature view '{}' has a source without an event timestamp column",
                view.name
            )));
        }

        if view.ttl_seconds < 0 {
            return Err(Error::config(format!(
                "feature view '{}' has a negative ttl ({}s)",
                view.name, view.ttl_seconds
            )));
        }

        Ok(())
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.snapshot.entity(name)
    }

    pub fn feature_view(&self, name: &str) -> Option<&FeatureView> {
        self.snapshot.feature_view(name)
    }

    /// Check that every ref is served by a registered view
    pub fn resolve(&self, feature_refs: &[FeatureRef]) -> Result<()> {
        self.snapshot.resolve(feature_refs)
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> RegistrySnapshot {
        self.snapshot
    }
}
