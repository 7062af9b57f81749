//! Feature Provider and offline store traits
//!
//! The scoring service never talks to a storage engine directly. It depends on
//! a `FeatureProvider` for point-in-time correct online lookups and holds an
//! `OfflineStore` handle for the historical store. Concrete implementations
//! live in `ridescore-online`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐  materialization  ┌────────────────────┐
//! │  Offline Store      │ ────(external)──► │   Online Store     │
//! │  (historical SQL)   │                   │  (Redis)           │
//! └─────────────────────┘                   └────────────────────┘
//!                                                     │ get_online_features
//!                                                     ▼
//!                                            ┌──────────────────┐
//!                                            │ Scoring Service  │
//!                                            └──────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use ridescore_core::{FeatureProvider, FeatureRef, EntityKey};
//!
//! async fn lookup(provider: &dyn FeatureProvider) -> ridescore_core::Result<()> {
//!     let refs = FeatureRef::parse_list(&["driver_stats:conv_rate"])?;
//!     let rows = vec![vec![EntityKey::new("driver_id", "17")]];
//!     let result = provider.get_online_features(&refs, &rows).await?;
//!     assert_eq!(result.row_count(), 1);
//!     Ok(())
//! }
//! ```

use crate::{EntityKey, EntityRow, FeatureRef, OnlineFeatures, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Online feature lookup capability
///
/// Implementations must be safe for concurrent read-only use: the scoring
/// context shares one provider across all in-flight requests.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    /// Get the latest feature values for the given entity rows
    ///
    /// # Arguments
    ///
    /// * `feature_refs` - Ordered `<view>:<feature>` references (the columns)
    /// * `entity_rows` - One or more rows of join-key values
    ///
    /// # Returns
    ///
    /// One `FeatureVector` per entity row, in input order. Features that the
    /// store has no value for are null.
    async fn get_online_features(
        &self,
        feature_refs: &[FeatureRef],
        entity_rows: &[EntityRow],
    ) -> Result<OnlineFeatures>;

    /// Check that the backing store is reachable
    async fn health_check(&self) -> Result<()>;

    /// Name of this provider type (for logging/metrics)
    fn provider_type(&self) -> &'static str;
}

/// Handle to the historical (offline) store
///
/// The scoring flow does not query it; the handle is held for the life of the
/// process so that an unreachable store is detected at initialization.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    fn store_type(&self) -> &'static str;
}

/// Group refs by feature view (views sorted by name)
pub fn group_by_view(feature_refs: &[FeatureRef]) -> BTreeMap<&str, Vec<&FeatureRef>> {
    let mut groups: BTreeMap<&str, Vec<&FeatureRef>> = BTreeMap::new();
    for r in feature_refs {
        groups.entry(r.view.as_str()).or_default().push(r);
    }
    groups
}

/// Build the online-store key for one view and its join keys
///
/// Format: `{feature_view}:{key1_name}={key1_value}:{key2_name}={key2_value}`
///
/// Keys are sorted by name for consistency.
pub fn build_online_key(feature_view: &str, entity_keys: &[EntityKey]) -> String {
    let mut parts = Vec::with_capacity(entity_keys.len() + 1);
    parts.push(feature_view.to_string());

    let mut sorted_keys: Vec<_> = entity_keys.iter().collect();
    sorted_keys.sort_by_key(|k| &k.name);

    for key in sorted_keys {
        parts.push(format!("{}={}", key.name, key.value));
    }

    parts.join(":")
}

/// Parse entity keys from a composite key
///
/// Reverse of `build_online_key`. Returns (feature_view, entity_keys).
pub fn parse_online_key(key: &str) -> Option<(String, Vec<EntityKey>)> {
    let mut parts = key.split(':');
    let feature_view = parts.next().filter(|v| !v.is_empty())?.to_string();

    let mut entity_keys = Vec::new();
    for part in parts {
        let (name, value) = part.split_once('=')?;
        entity_keys.push(EntityKey::new(name, value));
    }

    Some((feature_view, entity_keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeatureValue, FeatureVector};

    struct StaticProvider;

    #[async_trait]
    impl FeatureProvider for StaticProvider {
        async fn get_online_features(
            &self,
            feature_refs: &[FeatureRef],
            entity_rows: &[EntityRow],
        ) -> Result<OnlineFeatures> {
            let rows = entity_rows
                .iter()
                .map(|row| {
                    let mut vector = FeatureVector::new(row.clone());
                    for r in feature_refs {
                        vector.insert(r, FeatureValue::Int(42));
                    }
                    vector
                })
                .collect();
            Ok(OnlineFeatures::new(feature_refs.to_vec(), rows))
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }

        fn provider_type(&self) -> &'static str {
            "static"
        }
    }

    #[tokio::test]
    async fn test_provider_returns_one_row_per_entity_row() {
        let provider = StaticProvider;
        let refs = FeatureRef::parse_list(&["driver_stats:conv_rate"]).unwrap();
        let rows = vec![
            vec![EntityKey::new("driver_id", "1")],
            vec![EntityKey::new("driver_id", "2")],
        ];

        let result = provider.get_online_features(&refs, &rows).await.unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows[1].entities, rows[1]);
        assert!(result.is_complete());
    }

    #[test]
    fn test_build_online_key_single_entity() {
        let key = build_online_key("driver_stats", &[EntityKey::new("driver_id", "17")]);
        assert_eq!(key, "driver_stats:driver_id=17");
    }

    #[test]
    fn test_build_online_key_composite() {
        let key = build_online_key(
            "trip_features",
            &[
                EntityKey::new("driver_id", "17"),
                EntityKey::new("customer_id", "42"),
            ],
        );
        // Keys are sorted alphabetically by name
        assert_eq!(key, "trip_features:customer_id=42:driver_id=17");
    }

    #[test]
    fn test_parse_online_key() {
        let (view, keys) = parse_online_key("trip_features:customer_id=42:driver_id=17").unwrap();
        assert_eq!(view, "trip_features");
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], EntityKey::new("customer_id", "42"));

        assert!(parse_online_key("").is_none());
        assert!(parse_online_key("view:malformed").is_none());
    }

    #[test]
    fn test_group_by_view() {
        let refs = FeatureRef::parse_list(&[
            "driver_stats:conv_rate",
            "customer_profile:current_balance",
            "driver_stats:acc_rate",
        ])
        .unwrap();

        let groups = group_by_view(&refs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["driver_stats"].len(), 2);
        assert_eq!(groups["customer_profile"].len(), 1);
    }
}
