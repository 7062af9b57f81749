//! Registry snapshot: the declarative artifact shared by producer and consumer
//!
//! The Schema Registrar produces a `RegistrySnapshot`; the scoring service and
//! the feature providers consume it read-only to resolve feature references
//! and to find the join keys of each feature view.

use crate::{Entity, EntityKey, EntityRow, Error, FeatureRef, FeatureView, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All registered entities and feature views, keyed by name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistrySnapshot {
    /// Project the declarations belong to (e.g., "production")
    #[serde(default = "default_project")]
    pub project: String,

    pub entities: BTreeMap<String, Entity>,

    pub feature_views: BTreeMap<String, FeatureView>,
}

fn default_project() -> String {
    "default".to_string()
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::new(default_project())
    }
}

impl RegistrySnapshot {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            entities: BTreeMap::new(),
            feature_views: BTreeMap::new(),
        }
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn feature_view(&self, name: &str) -> Option<&FeatureView> {
        self.feature_views.get(name)
    }

    /// Check that every ref names a registered view and one of its features
    pub fn resolve(&self, feature_refs: &[FeatureRef]) -> Result<()> {
        for r in feature_refs {
            let view = self.feature_views.get(&r.view).ok_or_else(|| {
                Error::config(format!(
                    "feature '{}' references unregistered feature view '{}'",
                    r, r.view
                ))
            })?;

            if view.feature(&r.feature).is_none() {
                return Err(Error::config(format!(
                    "feature '{}' is not declared by feature view '{}'",
                    r.feature, r.view
                )));
            }
        }
        Ok(())
    }

    /// Entities of a view, in declaration order
    pub fn entities_for_view(&self, view: &str) -> Result<Vec<&Entity>> {
        let fv = self
            .feature_views
            .get(view)
            .ok_or_else(|| Error::config(format!("feature view '{}' is not registered", view)))?;

        fv.entities
            .iter()
            .map(|name| {
                self.entities.get(name).ok_or_else(|| {
                    Error::config(format!(
                        "feature view '{}' references unregistered entity '{}'",
                        view, name
                    ))
                })
            })
            .collect()
    }

    /// Distinct entities needed to look up `feature_refs`, first-seen order
    pub fn entities_for_refs(&self, feature_refs: &[FeatureRef]) -> Result<Vec<&Entity>> {
        let mut out: Vec<&Entity> = Vec::new();
        for r in feature_refs {
            for entity in self.entities_for_view(&r.view)? {
                if !out.iter().any(|e| e.name == entity.name) {
                    out.push(entity);
                }
            }
        }
        Ok(out)
    }

    /// Select from `row` the keys a view is joined on
    ///
    /// Fails with `InvalidInput` when the row lacks one of the view's join keys.
    pub fn keys_for_view(&self, view: &str, row: &EntityRow) -> Result<Vec<EntityKey>> {
        self.entities_for_view(view)?
            .into_iter()
            .map(|entity| {
                let join_key = entity.join_key();
                row.iter()
                    .find(|k| k.name == join_key)
                    .cloned()
                    .ok_or_else(|| {
                        Error::invalid_input(format!(
                            "entity row is missing join key '{}' required by '{}'",
                            join_key, view
                        ))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataSource, Feature, ValueType};
    use std::time::Duration;

    fn snapshot() -> RegistrySnapshot {
        let mut snap = RegistrySnapshot::new("production");
        snap.entities.insert(
            "driver".to_string(),
            Entity::new("driver", ValueType::Int64).with_join_key("driver_id"),
        );
        snap.entities.insert(
            "customer_id".to_string(),
            Entity::new("customer_id", ValueType::Int64),
        );
        snap.feature_views.insert(
            "driver_stats".to_string(),
            FeatureView::new(
                "driver_stats",
                vec!["driver".to_string()],
                vec![Feature::new("conv_rate", ValueType::Float)],
                DataSource::new("driver_hourly", "datetime"),
                Duration::from_secs(7200),
            ),
        );
        snap.feature_views.insert(
            "customer_profile".to_string(),
            FeatureView::new(
                "customer_profile",
                vec!["customer_id".to_string()],
                vec![Feature::new("current_balance", ValueType::Float)],
                DataSource::new("customer_profile", "datetime"),
                Duration::from_secs(172800),
            ),
        );
        snap
    }

    #[test]
    fn test_default_snapshot_uses_default_project() {
        let snap = RegistrySnapshot::default();
        assert_eq!(snap.project, "default");
        assert!(snap.entities.is_empty());

        let parsed: RegistrySnapshot =
            serde_json::from_str(r#"{"entities": {}, "feature_views": {}}"#).unwrap();
        assert_eq!(parsed, snap);
    }

    #[test]
    fn test_resolve_known_and_unknown_refs() {
        let snap = snapshot();
        let ok = FeatureRef::parse_list(&["driver_stats:conv_rate"]).unwrap();
        assert!(snap.resolve(&ok).is_ok());

        let unknown_view = FeatureRef::parse_list(&["trips:count"]).unwrap();
        assert!(matches!(snap.resolve(&unknown_view), Err(Error::Configuration(_))));

        let unknown_feature = FeatureRef::parse_list(&["driver_stats:speed"]).unwrap();
        assert!(matches!(snap.resolve(&unknown_feature), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_entities_for_refs_are_distinct() {
        let snap = snapshot();
        let refs = FeatureRef::parse_list(&[
            "driver_stats:conv_rate",
            "customer_profile:current_balance",
            "driver_stats:conv_rate",
        ])
        .unwrap();

        let names: Vec<_> = snap
            .entities_for_refs(&refs)
            .unwrap()
            .into_iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["driver", "customer_id"]);
    }

    #[test]
    fn test_keys_for_view_selects_join_keys() {
        let snap = snapshot();
        let row = vec![
            EntityKey::new("driver_id", "17"),
            EntityKey::new("customer_id", "42"),
        ];

        let keys = snap.keys_for_view("driver_stats", &row).unwrap();
        assert_eq!(keys, vec![EntityKey::new("driver_id", "17")]);

        let err = snap
            .keys_for_view("driver_stats", &vec![EntityKey::new("customer_id", "42")])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
