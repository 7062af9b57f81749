//! Shared fixtures for the server integration tests
//!
//! `TestBackends` hands out an in-memory provider seeded with the demo rows,
//! wrapped so tests can inject failures and count calls, and the demo model
//! wrapped to count predictions.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use ridescore_core::{
    EntityKey, EntityRow, Error, FeatureProvider, FeatureRef, FeatureTable, FeatureValue, Model,
    OfflineStore, OnlineFeatures, Prediction, RegistrySnapshot, Result,
};
use ridescore_online::{FeatureRow, InMemoryFeatureProvider, InMemoryOfflineStore};
use ridescore_registry::{FeatureRegistry, RepoDefinition};
use ridescore_server::config::ScoringConfig;
use ridescore_server::scoring::{Backends, DefaultBackends};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub fn demos_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

/// Apply the demo repository to a fresh registry file and return its location
pub async fn demo_registry(dir: &TempDir) -> String {
    let location = dir.path().join("registry.db").to_string_lossy().to_string();
    let registrar = RepoDefinition::load(demos_dir().join("driver_repo.yaml"))
        .unwrap()
        .into_registrar()
        .unwrap();
    let registry = FeatureRegistry::open(&location).await.unwrap();
    registry.apply(&registrar).await.unwrap();
    location
}

pub fn scoring_config(registry_location: &str) -> ScoringConfig {
    ScoringConfig {
        historical_connection: "memory://".to_string(),
        online_connection: "memory://".to_string(),
        registry_location: registry_location.to_string(),
        model_path: demos_dir().join("model").to_string_lossy().to_string(),
        ..Default::default()
    }
}

pub fn request(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    value.as_object().cloned().unwrap()
}

/// Online rows for driver 17 / customer 42 (complete) and customer 43 (no balance)
pub fn demo_rows() -> Vec<(&'static str, FeatureRow)> {
    let fresh = Utc::now() - ChronoDuration::minutes(5);
    vec![
        (
            "driver_stats",
            FeatureRow::new(vec![EntityKey::new("driver_id", "17")], fresh)
                .with_feature("conv_rate", FeatureValue::Float(0.8))
                .with_feature("acc_rate", FeatureValue::Float(0.9))
                .with_feature("avg_daily_trips", FeatureValue::Int(12)),
        ),
        (
            "driver_stats",
            FeatureRow::new(vec![EntityKey::new("driver_id", "5")], fresh)
                .with_feature("conv_rate", FeatureValue::Float(0.1))
                .with_feature("acc_rate", FeatureValue::Float(0.2))
                .with_feature("avg_daily_trips", FeatureValue::Int(1)),
        ),
        (
            "customer_profile",
            FeatureRow::new(vec![EntityKey::new("customer_id", "42")], fresh)
                .with_feature("current_balance", FeatureValue::Float(250.0))
                .with_feature("avg_passenger_count", FeatureValue::Float(1.6))
                .with_feature("lifetime_trip_count", FeatureValue::Int(180)),
        ),
        (
            "customer_profile",
            FeatureRow::new(vec![EntityKey::new("customer_id", "7")], fresh)
                .with_feature("current_balance", FeatureValue::Float(5.0))
                .with_feature("avg_passenger_count", FeatureValue::Float(1.0))
                .with_feature("lifetime_trip_count", FeatureValue::Int(3)),
        ),
        (
            "customer_profile",
            FeatureRow::new(vec![EntityKey::new("customer_id", "43")], fresh)
                .with_feature("current_balance", FeatureValue::Null)
                .with_feature("avg_passenger_count", FeatureValue::Float(1.2))
                .with_feature("lifetime_trip_count", FeatureValue::Int(30)),
        ),
    ]
}

/// Provider wrapper that can fail or stall the first lookups
pub struct ScriptedProvider {
    inner: InMemoryFeatureProvider,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl FeatureProvider for ScriptedProvider {
    async fn get_online_features(
        &self,
        feature_refs: &[FeatureRef],
        entity_rows: &[EntityRow],
    ) -> Result<OnlineFeatures> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::provider("connection reset by peer"));
        }

        self.inner.get_online_features(feature_refs, entity_rows).await
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn provider_type(&self) -> &'static str {
        "scripted"
    }
}

/// Model wrapper counting `predict` calls
pub struct CountingModel {
    inner: Arc<dyn Model>,
    calls: Arc<AtomicUsize>,
}

impl Model for CountingModel {
    fn predict(&self, table: &FeatureTable) -> Result<Vec<Prediction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict(table)
    }

    fn feature_names(&self) -> &[String] {
        self.inner.feature_names()
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}

#[derive(Default)]
pub struct TestBackends {
    pub online_unreachable: bool,
    pub lookup_failures: usize,
    pub lookup_delay: Option<Duration>,
    pub lookup_calls: Arc<AtomicUsize>,
    pub predict_calls: Arc<AtomicUsize>,
    pub model_loaded: Arc<AtomicBool>,
    pub stale_drivers: bool,
    /// Store driver trip counts as text, as a misbehaving producer would
    pub textual_trip_counts: bool,
}

impl TestBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookups(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn predictions(&self) -> usize {
        self.predict_calls.load(Ordering::SeqCst)
    }

    pub fn model_was_loaded(&self) -> bool {
        self.model_loaded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backends for TestBackends {
    async fn connect_online(
        &self,
        _connection: &str,
        snapshot: Arc<RegistrySnapshot>,
    ) -> Result<Arc<dyn FeatureProvider>> {
        if self.online_unreachable {
            return Err(Error::connection("failed to connect to Redis: Connection refused"));
        }

        let inner = InMemoryFeatureProvider::new(snapshot);
        for (view, mut row) in demo_rows() {
            if self.stale_drivers && view == "driver_stats" {
                row.event_timestamp = Utc::now() - ChronoDuration::hours(3);
            }
            if self.textual_trip_counts {
                if let Some(FeatureValue::Int(n)) = row.features.get("avg_daily_trips").cloned() {
                    row.features
                        .insert("avg_daily_trips".to_string(), FeatureValue::String(n.to_string()));
                }
            }
            inner.write_online_features(view, vec![row]).await?;
        }

        Ok(Arc::new(ScriptedProvider {
            inner,
            failures_left: AtomicUsize::new(self.lookup_failures),
            delay: self.lookup_delay,
            calls: self.lookup_calls.clone(),
        }))
    }

    async fn connect_offline(
        &self,
        _connection: &str,
        _snapshot: &RegistrySnapshot,
    ) -> Result<Arc<dyn OfflineStore>> {
        Ok(Arc::new(InMemoryOfflineStore))
    }

    fn load_model(&self, path: &str) -> Result<Arc<dyn Model>> {
        self.model_loaded.store(true, Ordering::SeqCst);
        let inner = DefaultBackends.load_model(path)?;
        Ok(Arc::new(CountingModel {
            inner,
            calls: self.predict_calls.clone(),
        }))
    }
}
