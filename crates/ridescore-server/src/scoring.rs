//! Scoring service
//!
//! `ScoringContext::initialize` builds the process-wide context once:
//!
//! 1. Validate the configuration
//! 2. Load the registry snapshot and resolve the configured feature refs
//! 3. Connect and check the online store
//! 4. Connect and check the offline store
//! 5. Load the model and check its column order
//!
//! A failure at any step stops initialization; nothing after it runs.
//!
//! `ScoringContext::score` then serves one request at a time:
//!
//! ```text
//! {"driver": 17, "customer_id": 42}
//!        │ entity row (join keys)
//!        ▼
//!  get_online_features ──► any null? ──yes──► 0
//!        │ no
//!        ▼
//!  Model::predict ──► [1]
//! ```

use crate::config::ScoringConfig;
use crate::metrics;
use async_trait::async_trait;
use ridescore_core::retry::{is_retryable, retry_async_if, RetryPolicy};
use ridescore_core::{
    load_model, Entity, EntityKey, EntityRow, Error, FeatureProvider, FeatureRef, Model,
    OfflineStore, OnlineFeatures, Prediction, RegistrySnapshot, Result,
};
use ridescore_online::{
    redact_url, InMemoryFeatureProvider, InMemoryOfflineStore, PostgresConfig,
    PostgresOfflineStore, RedisConfig, RedisFeatureProvider,
};
use ridescore_registry::FeatureRegistry;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Raw scoring request: entity name (or join key) to key value
pub type ScoreRequest = serde_json::Map<String, serde_json::Value>;

/// Result of one score call
///
/// Serializes as `0` when the feature row was incomplete and as the list of
/// predictions otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Incomplete,
    Prediction(Vec<Prediction>),
}

impl ScoreOutcome {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ScoreOutcome::Incomplete)
    }

    fn label(&self) -> &'static str {
        match self {
            ScoreOutcome::Incomplete => "incomplete",
            ScoreOutcome::Prediction(_) => "prediction",
        }
    }
}

impl Serialize for ScoreOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScoreOutcome::Incomplete => serializer.serialize_i64(0),
            ScoreOutcome::Prediction(predictions) => predictions.serialize(serializer),
        }
    }
}

/// Factory for the stores and the model used by `initialize`
#[async_trait]
pub trait Backends: Send + Sync {
    async fn connect_online(
        &self,
        connection: &str,
        snapshot: Arc<RegistrySnapshot>,
    ) -> Result<Arc<dyn FeatureProvider>>;

    async fn connect_offline(
        &self,
        connection: &str,
        snapshot: &RegistrySnapshot,
    ) -> Result<Arc<dyn OfflineStore>>;

    fn load_model(&self, path: &str) -> Result<Arc<dyn Model>>;
}

/// Redis / PostgreSQL / file model, plus `memory://` for local runs
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackends;

fn scheme(connection: &str) -> &str {
    connection.split_once("://").map(|(s, _)| s).unwrap_or("")
}

#[async_trait]
impl Backends for DefaultBackends {
    async fn connect_online(
        &self,
        connection: &str,
        snapshot: Arc<RegistrySnapshot>,
    ) -> Result<Arc<dyn FeatureProvider>> {
        match scheme(connection) {
            "redis" | "rediss" => {
                let provider =
                    RedisFeatureProvider::connect(RedisConfig::new(connection), snapshot).await?;
                Ok(Arc::new(provider))
            }
            "memory" => Ok(Arc::new(InMemoryFeatureProvider::new(snapshot))),
            _ => Err(Error::config(format!(
                "unsupported online store '{}'",
                redact_url(connection)
            ))),
        }
    }

    async fn connect_offline(
        &self,
        connection: &str,
        snapshot: &RegistrySnapshot,
    ) -> Result<Arc<dyn OfflineStore>> {
        match scheme(connection) {
            "postgres" | "postgresql" => {
                let store = PostgresOfflineStore::connect(PostgresConfig::new(connection)).await?;
                match store.missing_sources(snapshot).await {
                    Ok(missing) => {
                        for table in missing {
                            warn!(table = %table, "Data source table not found in offline store");
                        }
                    }
                    Err(e) => warn!(error = %e, "Could not check data source tables"),
                }
                Ok(Arc::new(store))
            }
            "memory" => Ok(Arc::new(InMemoryOfflineStore)),
            _ => Err(Error::config(format!(
                "unsupported offline store '{}'",
                redact_url(connection)
            ))),
        }
    }

    fn load_model(&self, path: &str) -> Result<Arc<dyn Model>> {
        load_model(path)
    }
}

/// Process-wide scoring state, immutable after `initialize`
pub struct ScoringContext {
    feature_refs: Vec<FeatureRef>,
    /// Entities a request must identify, first-seen order over the refs
    request_entities: Vec<Entity>,
    snapshot: Arc<RegistrySnapshot>,
    registry: FeatureRegistry,
    provider: Arc<dyn FeatureProvider>,
    offline: Arc<dyn OfflineStore>,
    model: Arc<dyn Model>,
    retry: RetryPolicy,
    lookup_timeout: Option<Duration>,
}

impl ScoringContext {
    /// Initialize with the default backends
    pub async fn initialize(config: &ScoringConfig) -> Result<Self> {
        Self::initialize_with(config, &DefaultBackends).await
    }

    /// Initialize with caller-supplied backends
    ///
    /// # Errors
    ///
    /// - `Configuration`: invalid config, unreadable registry, unknown or
    ///   string-typed feature ref
    /// - `Connection`: either store is unreachable
    /// - `ModelLoad`: missing/corrupt artifact or column order mismatch
    pub async fn initialize_with(config: &ScoringConfig, backends: &dyn Backends) -> Result<Self> {
        let feature_refs = config.validate()?;

        let registry = FeatureRegistry::open_existing(&config.registry_location)
            .await
            .map_err(|e| {
                Error::config(format!(
                    "failed to open registry '{}': {:#}",
                    config.registry_location, e
                ))
            })?;
        let registrar = registry
            .load_registrar()
            .await
            .map_err(|e| Error::config(format!("invalid registry contents: {:#}", e)))?;
        let snapshot = Arc::new(registrar.into_snapshot());

        snapshot.resolve(&feature_refs)?;
        check_numeric_features(&snapshot, &feature_refs)?;
        let request_entities: Vec<Entity> = snapshot
            .entities_for_refs(&feature_refs)?
            .into_iter()
            .cloned()
            .collect();

        let provider = backends
            .connect_online(&config.online_connection, snapshot.clone())
            .await?;
        provider
            .health_check()
            .await
            .map_err(|e| as_connection_error("online store", e))?;

        let offline = backends
            .connect_offline(&config.historical_connection, &snapshot)
            .await?;
        offline
            .health_check()
            .await
            .map_err(|e| as_connection_error("offline store", e))?;

        let model = backends.load_model(&config.model_path)?;
        check_model_columns(model.as_ref(), &feature_refs)?;

        info!(
            project = %snapshot.project,
            features = feature_refs.len(),
            entities = ?request_entities.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            online_store = provider.provider_type(),
            offline_store = offline.store_type(),
            model = model.kind(),
            retries = config.retry.max_retries,
            lookup_timeout_ms = ?config.lookup_timeout_ms,
            "Scoring context initialized"
        );

        Ok(Self {
            feature_refs,
            request_entities,
            snapshot,
            registry,
            provider,
            offline,
            model,
            retry: RetryPolicy::from(&config.retry),
            lookup_timeout: config.lookup_timeout_ms.map(Duration::from_millis),
        })
    }

    /// Score one request
    ///
    /// Returns `ScoreOutcome::Incomplete` without calling the model when any
    /// configured feature is null for the request's entities.
    pub async fn score(&self, request: &ScoreRequest) -> Result<ScoreOutcome> {
        let start = Instant::now();
        let result = self.score_row(request).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(outcome) => metrics::record_score(outcome.label(), elapsed),
            Err(e) => {
                metrics::record_score("error", elapsed);
                metrics::record_error(error_label(e), "scoring");
            }
        }

        result
    }

    async fn score_row(&self, request: &ScoreRequest) -> Result<ScoreOutcome> {
        let row = self.entity_row(request)?;
        let features = self.lookup(std::slice::from_ref(&row)).await?;

        let Some(vector) = features.rows.first() else {
            return Err(Error::internal("feature provider returned no rows"));
        };

        let missing = vector.missing(&self.feature_refs);
        if !missing.is_empty() {
            for r in &missing {
                metrics::record_missing_feature(&r.to_string());
            }
            debug!(
                entities = ?row,
                missing = ?missing.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
                "Incomplete feature row, model not invoked"
            );
            return Ok(ScoreOutcome::Incomplete);
        }

        let table = features.to_table()?;
        let predictions = self.model.predict(&table)?;

        debug!(entities = ?row, predictions = ?predictions, "Scored");
        Ok(ScoreOutcome::Prediction(predictions))
    }

    /// Turn a request into one entity row keyed by join key
    ///
    /// Each entity is looked up under its name first, then its join key.
    pub fn entity_row(&self, request: &ScoreRequest) -> Result<EntityRow> {
        self.request_entities
            .iter()
            .map(|entity| {
                let join_key = entity.join_key();
                let value = request
                    .get(&entity.name)
                    .or_else(|| request.get(join_key))
                    .ok_or_else(|| {
                        Error::invalid_input(format!(
                            "request is missing entity '{}'",
                            entity.name
                        ))
                    })?;

                if !entity.value_type.accepts_json(value) {
                    return Err(Error::invalid_input(format!(
                        "entity '{}' expects a {} value, got {}",
                        entity.name, entity.value_type, value
                    )));
                }

                Ok(EntityKey::new(join_key, key_value(value)))
            })
            .collect()
    }

    async fn lookup(&self, rows: &[EntityRow]) -> Result<OnlineFeatures> {
        let attempt = || async move {
            let fut = self.provider.get_online_features(&self.feature_refs, rows);
            match self.lookup_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
                },
                None => fut.await,
            }
        };

        let start = Instant::now();
        let result = retry_async_if(&self.retry, attempt, is_retryable).await;
        metrics::record_lookup(
            self.provider.provider_type(),
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }

    /// Feature refs in model column order
    pub fn feature_refs(&self) -> &[FeatureRef] {
        &self.feature_refs
    }

    /// Entities a request must carry
    pub fn request_entities(&self) -> &[Entity] {
        &self.request_entities
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn provider(&self) -> &dyn FeatureProvider {
        self.provider.as_ref()
    }

    pub fn offline_store(&self) -> &dyn OfflineStore {
        self.offline.as_ref()
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Release store handles and the model
    pub fn shutdown(self) {
        info!(
            online_store = self.provider.provider_type(),
            offline_store = self.offline.store_type(),
            "Scoring context released"
        );
    }
}

fn as_connection_error(store: &str, err: Error) -> Error {
    match err {
        Error::Connection(_) => err,
        other => Error::connection(format!("{} health check failed: {}", store, other)),
    }
}

fn check_model_columns(model: &dyn Model, feature_refs: &[FeatureRef]) -> Result<()> {
    let expected: Vec<String> = feature_refs.iter().map(FeatureRef::column_name).collect();
    if model.feature_names() != expected.as_slice() {
        return Err(Error::model_load(format!(
            "model expects columns [{}] but the configured feature order is [{}]",
            model.feature_names().join(", "),
            expected.join(", ")
        )));
    }
    Ok(())
}

/// Every configured feature must be a model-consumable numeric type
fn check_numeric_features(snapshot: &RegistrySnapshot, feature_refs: &[FeatureRef]) -> Result<()> {
    for r in feature_refs {
        let value_type = snapshot
            .feature_view(&r.view)
            .and_then(|v| v.feature(&r.feature))
            .map(|f| f.value_type);
        if let Some(value_type) = value_type {
            if !value_type.is_numeric() {
                return Err(Error::config(format!(
                    "feature '{}' has type {} which the model cannot consume",
                    r, value_type
                )));
            }
        }
    }
    Ok(())
}

/// Key values are stored as strings; JSON strings lose their quotes
fn key_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn error_label(err: &Error) -> &'static str {
    match err {
        Error::Configuration(_) => "configuration",
        Error::Connection(_) => "connection",
        Error::ModelLoad(_) => "model_load",
        Error::InvalidInput(_) => "invalid_input",
        Error::Provider(_) => "provider",
        Error::Prediction(_) => "prediction",
        Error::Serialization(_) => "serialization",
        Error::Timeout(_) => "timeout",
        Error::Internal(_) => "internal",
    }
}
