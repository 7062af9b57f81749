//! RideScore Online - feature providers for real-time scoring
//!
//! Implementations of the `FeatureProvider` and `OfflineStore` seams from
//! `ridescore-core`.
//!
//! ## Architecture
//!
//! ```text
//!   ┌───────────────┐   materialization   ┌────────────────┐
//!   │ Offline store │ ───── (external) ──► │  Online store  │
//!   │  (Postgres)   │                      │    (Redis)     │
//!   └───────────────┘                      └────────────────┘
//!                                                  │ MGET
//!                                                  ▼
//!                                       ┌────────────────────┐
//!                                       │ RedisFeatureProvider│
//!                                       └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ridescore_online::{RedisConfig, RedisFeatureProvider};
//!
//! let provider = RedisFeatureProvider::connect(
//!     RedisConfig::new("redis://localhost:6379"),
//!     snapshot.clone(),
//! ).await?;
//!
//! let features = provider.get_online_features(&refs, &rows).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `redis` (default): Redis feature provider
//! - `postgres` (default): PostgreSQL offline store handle

pub use ridescore_core::{
    build_online_key, parse_online_key, EntityKey, FeatureProvider, FeatureValue, OfflineStore,
};

mod lookup;
pub mod memory_store;
pub mod record;

pub use memory_store::{InMemoryFeatureProvider, InMemoryOfflineStore};
pub use record::{FeatureRow, OnlineRecord};

#[cfg(feature = "redis")]
pub mod redis_store;
#[cfg(feature = "redis")]
pub use redis_store::{RedisConfig, RedisFeatureProvider};

#[cfg(feature = "postgres")]
pub mod postgres_store;
#[cfg(feature = "postgres")]
pub use postgres_store::{PostgresConfig, PostgresOfflineStore};

/// Replace the credentials of a connection URL with `***` for logging
pub fn redact_url(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((scheme_and_auth, host)) => match scheme_and_auth.split_once("://") {
            Some((scheme, _)) => format!("{}://***@{}", scheme, host),
            None => format!("***@{}", host),
        },
        None => url.to_string(),
    }
}
