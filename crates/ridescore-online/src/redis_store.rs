//! Redis feature provider
//!
//! 1. **Single round-trip reads**: one MGET covers every view and entity row
//! 2. **Multiplexed connection**: `ConnectionManager` shares one TCP connection
//!    across concurrent requests and reconnects on failure
//! 3. **Pipelined writes**: seeding writes are batched with SET / SET EX
//!
//! Keys follow `build_online_key`; values are JSON `OnlineRecord`s.

use crate::{lookup, redact_url};
use crate::record::{FeatureRow, OnlineRecord};
use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Pipeline};
use ridescore_core::{
    EntityRow, Error, FeatureProvider, FeatureRef, OnlineFeatures, RegistrySnapshot, Result,
};
use std::sync::Arc;

/// Redis provider configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    /// Pipeline batch size for writes
    pub write_batch_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            write_batch_size: 1000,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Online feature lookups backed by Redis
pub struct RedisFeatureProvider {
    conn: ConnectionManager,
    config: RedisConfig,
    snapshot: Arc<RegistrySnapshot>,
}

impl RedisFeatureProvider {
    /// Connect to Redis
    ///
    /// # Errors
    ///
    /// `Connection` when the URL is invalid or the server cannot be reached.
    pub async fn connect(config: RedisConfig, snapshot: Arc<RegistrySnapshot>) -> Result<Self> {
        let client = Client::open(config.url.clone())
            .map_err(|e| Error::connection(format!("invalid Redis URL: {}", e)))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::connection(format!("failed to connect to Redis: {}", e)))?;

        tracing::info!(url = %redact_url(&config.url), "Connected to Redis online store");

        Ok(Self {
            conn,
            config,
            snapshot,
        })
    }

    /// Write rows for one feature view using pipelined SET commands
    ///
    /// Keys expire after the view's ttl when it is non-zero.
    pub async fn write_online_features(
        &self,
        feature_view: &str,
        rows: Vec<FeatureRow>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let ttl = self
            .snapshot
            .feature_view(feature_view)
            .map(|v| v.ttl_seconds)
            .unwrap_or_default();

        let mut conn = self.conn.clone();
        for chunk in rows.chunks(self.config.write_batch_size.max(1)) {
            let mut pipe = Pipeline::new();

            for row in chunk {
                let key = lookup::write_key(&self.snapshot, feature_view, &row.entities)?;
                let value = row.to_record().encode()?;

                if ttl > 0 {
                    pipe.set_ex(&key, value, ttl as u64);
                } else {
                    pipe.set(&key, value);
                }
            }

            pipe.query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| Error::provider(format!("Redis pipeline error: {}", e)))?;
        }

        tracing::debug!(
            feature_view = feature_view,
            rows_written = rows.len(),
            "Redis write complete"
        );

        Ok(rows.len())
    }
}

#[async_trait]
impl FeatureProvider for RedisFeatureProvider {
    async fn get_online_features(
        &self,
        feature_refs: &[FeatureRef],
        entity_rows: &[EntityRow],
    ) -> Result<OnlineFeatures> {
        let lookups = lookup::plan(&self.snapshot, feature_refs, entity_rows)?;

        let keys: Vec<&String> = lookups.iter().flat_map(|l| l.keys.iter()).collect();
        if keys.is_empty() {
            return Ok(lookup::assemble(
                feature_refs,
                entity_rows,
                &lookups,
                Vec::new(),
                Utc::now(),
            ));
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> = conn
            .mget(&keys)
            .await
            .map_err(|e| Error::provider(format!("Redis MGET error: {}", e)))?;

        let mut values = values.into_iter();
        let mut fetched = Vec::with_capacity(lookups.len());
        for l in &lookups {
            let mut records = Vec::with_capacity(l.keys.len());
            for key in &l.keys {
                let record = match values.next().flatten() {
                    Some(data) => Some(OnlineRecord::decode(&data).map_err(|e| {
                        Error::provider(format!("corrupt online record at '{}': {}", key, e))
                    })?),
                    None => None,
                };
                records.push(record);
            }
            fetched.push(records);
        }

        Ok(lookup::assemble(
            feature_refs,
            entity_rows,
            &lookups,
            fetched,
            Utc::now(),
        ))
    }

    /// Health check using PING
    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::connection(format!("Redis PING failed: {}", e)))?;

        if pong != "PONG" {
            return Err(Error::connection(format!(
                "Redis health check failed: expected PONG, got {}",
                pong
            )));
        }

        Ok(())
    }

    fn provider_type(&self) -> &'static str {
        "redis"
    }
}
