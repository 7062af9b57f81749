//! Online record format
//!
//! Each (feature view, entity) pair is stored under the key produced by
//! `build_online_key` as a JSON document:
//!
//! ```json
//! {"event_timestamp": 1700000000, "features": {"conv_rate": 0.81, "acc_rate": 0.93}}
//! ```

use chrono::{DateTime, Utc};
use ridescore_core::{EntityKey, FeatureValue, FeatureView, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A row to write to an online store
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Join-key values identifying the entity (e.g., driver_id=17)
    pub entities: Vec<EntityKey>,
    /// Feature name → value, without the view prefix
    pub features: HashMap<String, FeatureValue>,
    pub event_timestamp: DateTime<Utc>,
}

impl FeatureRow {
    pub fn new(entities: Vec<EntityKey>, event_timestamp: DateTime<Utc>) -> Self {
        Self {
            entities,
            features: HashMap::new(),
            event_timestamp,
        }
    }

    pub fn with_feature(mut self, name: impl Into<String>, value: FeatureValue) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    pub(crate) fn to_record(&self) -> OnlineRecord {
        OnlineRecord {
            event_timestamp: self.event_timestamp,
            features: self.features.clone(),
        }
    }
}

/// The stored value of one online key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineRecord {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub event_timestamp: DateTime<Utc>,
    pub features: HashMap<String, FeatureValue>,
}

impl OnlineRecord {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Whether the record is within the view's ttl at `now`
    ///
    /// A ttl of zero never expires. Records stamped in the future are fresh.
    pub fn is_fresh(&self, view: &FeatureView, now: DateTime<Utc>) -> bool {
        if view.ttl_seconds <= 0 {
            return true;
        }
        (now - self.event_timestamp).num_seconds() <= view.ttl_seconds
    }
}
