//! # RideScore Core Library
//!
//! Foundation library for RideScore, containing the data model, error types
//! and trait seams shared by the registrar, the feature providers and the
//! scoring service.
//!
//! ## Key Components
//!
//! - **Types**: Entities, data sources, feature views, feature vectors
//! - **RegistrySnapshot**: The declarative artifact produced by the registrar
//! - **FeatureProvider / OfflineStore**: The narrow interface to the feature store
//! - **Model**: The predictor abstraction and its artifact loader
//! - **Errors**: Strongly-typed error handling
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use ridescore_core::{FeatureProvider, FeatureRef, EntityKey};
//!
//! async fn fetch(provider: &dyn FeatureProvider) -> ridescore_core::Result<()> {
//!     let refs = FeatureRef::parse_list(&["driver_stats:conv_rate"])?;
//!     let rows = vec![vec![EntityKey::new("driver_id", "17")]];
//!     let features = provider.get_online_features(&refs, &rows).await?;
//!     println!("Features: {:?}", features);
//!     Ok(())
//! }
//! ```

pub use error::{Error, Result};
pub use model::{load_model, Model, ModelArtifact, Prediction};
pub use provider::{build_online_key, parse_online_key, FeatureProvider, OfflineStore};
pub use schema::RegistrySnapshot;
pub use types::{
    DataSource, Entity, EntityKey, EntityRow, Feature, FeatureRef, FeatureTable, FeatureValue,
    FeatureVector, FeatureView, OnlineFeatures, ValueType,
};

mod error;
pub mod model;
pub mod provider;
pub mod retry;
mod schema;
mod types;

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the guard if a previous holder panicked
pub fn recover_mutex<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    match mutex.lock() {
        Ok(guard) => Ok(guard),
        Err(poisoned) => {
            tracing::warn!(lock = name, "Recovering poisoned mutex");
            Ok(poisoned.into_inner())
        }
    }
}

/// Commonly used imports: `use ridescore_core::prelude::*`
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::model::{Model, Prediction};
    pub use crate::provider::{FeatureProvider, OfflineStore};
    pub use crate::schema::RegistrySnapshot;
    pub use crate::types::{
        Entity, EntityKey, EntityRow, FeatureRef, FeatureValue, FeatureVector, FeatureView,
        OnlineFeatures,
    };
}
