//! Application state shared across all HTTP handlers
//!
//! Rather than using global variables, we pass state explicitly to each
//! handler. Axum requires state to be Clone + Send + Sync, so the scoring
//! context sits behind an Arc and is only ever read.

use crate::scoring::ScoringContext;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    context: Arc<ScoringContext>,

    /// Server start time (for uptime reporting)
    start_time: std::time::Instant,
}

impl AppState {
    pub fn new(context: Arc<ScoringContext>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                context,
                start_time: std::time::Instant::now(),
            }),
        }
    }

    pub fn context(&self) -> &ScoringContext {
        &self.inner.context
    }

    /// Returns the server uptime in seconds
    pub fn uptime(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }
}
