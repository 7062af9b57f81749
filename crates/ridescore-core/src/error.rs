//! Error types for RideScore
//!
//! This module defines every error that can surface from registration,
//! initialization or a scoring request. We use the `thiserror` crate to keep
//! the definitions concise.
//!
//! An incomplete feature row is *not* an error: it is reported through
//! `ScoreOutcome::Incomplete` by the scoring service.

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors that can occur in RideScore
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing schema references, or an invalid configuration value
    ///
    /// Raised by the Schema Registrar and by eager config validation.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Offline or online store could not be reached during initialization
    #[error("Connection error: {0}")]
    Connection(String),

    /// Model artifact is missing, unreadable or corrupt
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Malformed request (missing entity key, wrong value type, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure reported by the Feature Provider during a lookup
    ///
    /// We wrap the original error to preserve context.
    #[error("Provider error: {0}")]
    Provider(#[from] anyhow::Error),

    /// Failure reported by the model during prediction
    #[error("Prediction error: {0}")]
    Prediction(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A bounded operation did not finish in time
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    /// Internal error - indicates a bug in our code
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a Configuration error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a Connection error from a string
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a ModelLoad error from a string
    pub fn model_load(msg: impl Into<String>) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Creates an InvalidInput error from a string
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a Provider error from any displayable error
    pub fn provider(msg: impl std::fmt::Display) -> Self {
        Self::Provider(anyhow::anyhow!("{}", msg))
    }

    /// Creates a Prediction error from a string
    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    /// Creates an Internal error from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
