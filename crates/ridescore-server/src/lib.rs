//! RideScore Server Library
//!
//! The scoring context plus the HTTP and CLI surfaces around it. Exposed as a
//! library so integration tests can build the router and the context directly.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ridescore_server::{config, scoring::ScoringContext};
//!
//! let config = config::load("ridescore.yaml")?;
//! let context = ScoringContext::initialize(&config.scoring).await?;
//!
//! let request = serde_json::json!({"driver": 17, "customer_id": 42});
//! let outcome = context.score(request.as_object().unwrap()).await?;
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod request_id;
pub mod scoring;
pub mod shutdown;
pub mod state;

pub use scoring::{Backends, DefaultBackends, ScoreOutcome, ScoreRequest, ScoringContext};
