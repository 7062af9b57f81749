//! In-process feature provider
//!
//! Holds online records in a map keyed exactly like the Redis store. Used by
//! tests and by local runs with `memory://` as the online store location.

use crate::lookup;
use crate::record::{FeatureRow, OnlineRecord};
use async_trait::async_trait;
use chrono::Utc;
use ridescore_core::{
    EntityRow, FeatureProvider, FeatureRef, OfflineStore, OnlineFeatures, RegistrySnapshot, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct InMemoryFeatureProvider {
    snapshot: Arc<RegistrySnapshot>,
    records: RwLock<HashMap<String, OnlineRecord>>,
}

impl InMemoryFeatureProvider {
    pub fn new(snapshot: Arc<RegistrySnapshot>) -> Self {
        Self {
            snapshot,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert rows for one feature view; returns the number of rows written
    pub async fn write_online_features(
        &self,
        feature_view: &str,
        rows: Vec<FeatureRow>,
    ) -> Result<usize> {
        let mut encoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = lookup::write_key(&self.snapshot, feature_view, &row.entities)?;
            encoded.push((key, row.to_record()));
        }

        let count = encoded.len();
        self.records.write().await.extend(encoded);

        tracing::debug!(feature_view, rows_written = count, "In-memory write complete");
        Ok(count)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl FeatureProvider for InMemoryFeatureProvider {
    async fn get_online_features(
        &self,
        feature_refs: &[FeatureRef],
        entity_rows: &[EntityRow],
    ) -> Result<OnlineFeatures> {
        let lookups = lookup::plan(&self.snapshot, feature_refs, entity_rows)?;

        let records = self.records.read().await;
        let fetched: Vec<Vec<Option<OnlineRecord>>> = lookups
            .iter()
            .map(|l| l.keys.iter().map(|k| records.get(k).cloned()).collect())
            .collect();
        drop(records);

        Ok(lookup::assemble(
            feature_refs,
            entity_rows,
            &lookups,
            fetched,
            Utc::now(),
        ))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn provider_type(&self) -> &'static str {
        "memory"
    }
}

/// Offline store stand-in for `memory://` deployments
#[derive(Debug, Default)]
pub struct InMemoryOfflineStore;

#[async_trait]
impl OfflineStore for InMemoryOfflineStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
