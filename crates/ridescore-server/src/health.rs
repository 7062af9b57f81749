//! Liveness and readiness checks
//!
//! `/health` answers as long as the process serves requests. `/health/ready`
//! checks the three things a score depends on: the online store, the
//! historical store handle and the registry database. A slow check is
//! reported as `degraded` but does not make the service unready.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Instant;

use crate::state::AppState;

/// Checks slower than this report `degraded`
const DEGRADED_LATENCY_MS: u64 = 1000;

#[derive(Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub online_store: CheckResult,
    pub offline_store: CheckResult,
    pub registry: CheckResult,
}

/// Outcome of checking one dependency
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl CheckResult {
    /// Classify a successful check by how long it took
    fn passed(started: Instant, details: Value) -> Self {
        let latency_ms = started.elapsed().as_millis() as u64;
        let (status, message) = if latency_ms > DEGRADED_LATENCY_MS {
            (CheckStatus::Degraded, Some(format!("check took {} ms", latency_ms)))
        } else {
            (CheckStatus::Healthy, None)
        };

        Self {
            status,
            latency_ms: Some(latency_ms),
            message,
            details: Some(details),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status: CheckStatus::Unhealthy,
            latency_ms: None,
            message: Some(message),
            details: None,
        }
    }

    fn is_serving(&self) -> bool {
        self.status != CheckStatus::Unhealthy
    }
}

/// `GET /health`
pub async fn liveness(State(state): State<AppState>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "ok",
        uptime_seconds: state.uptime(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /health/ready`
///
/// 200 when no check failed, 503 otherwise. The body always carries every
/// check result.
pub async fn readiness(State(state): State<AppState>) -> Response {
    let (online_store, offline_store, registry) = tokio::join!(
        check_online_store(&state),
        check_offline_store(&state),
        check_registry(&state),
    );

    let ready = online_store.is_serving() && offline_store.is_serving() && registry.is_serving();
    if !ready {
        tracing::warn!(
            online_store = ?online_store.status,
            offline_store = ?offline_store.status,
            registry = ?registry.status,
            "Readiness check failed"
        );
    }

    let body = Json(ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" },
        uptime_seconds: state.uptime(),
        version: env!("CARGO_PKG_VERSION"),
        checks: ReadinessChecks {
            online_store,
            offline_store,
            registry,
        },
    });

    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, body).into_response()
}

async fn check_online_store(state: &AppState) -> CheckResult {
    let context = state.context();
    let provider = context.provider();
    let started = Instant::now();
    match provider.health_check().await {
        Ok(()) => CheckResult::passed(
            started,
            json!({
                "provider": provider.provider_type(),
                "feature_refs": context.feature_refs().len()
            }),
        ),
        Err(e) => CheckResult::failed(e.to_string()),
    }
}

async fn check_offline_store(state: &AppState) -> CheckResult {
    let store = state.context().offline_store();
    let started = Instant::now();
    match store.health_check().await {
        Ok(()) => CheckResult::passed(started, json!({ "store": store.store_type() })),
        Err(e) => CheckResult::failed(e.to_string()),
    }
}

async fn check_registry(state: &AppState) -> CheckResult {
    let context = state.context();
    let started = Instant::now();
    match context.registry().list_feature_views(None).await {
        Ok(views) => CheckResult::passed(
            started,
            json!({
                "project": context.snapshot().project,
                "feature_view_count": views.len()
            }),
        ),
        Err(e) => CheckResult::failed(format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fast_check_is_healthy() {
        let result = CheckResult::passed(Instant::now(), json!({"store": "memory"}));
        assert_eq!(result.status, CheckStatus::Healthy);
        assert!(result.message.is_none());
        assert_eq!(result.details, Some(json!({"store": "memory"})));
    }

    #[test]
    fn test_slow_check_is_degraded_but_serving() {
        let started = Instant::now() - Duration::from_millis(DEGRADED_LATENCY_MS + 500);
        let result = CheckResult::passed(started, json!({}));
        assert_eq!(result.status, CheckStatus::Degraded);
        assert!(result.latency_ms.unwrap() > DEGRADED_LATENCY_MS);
        assert!(result.is_serving());
    }

    #[test]
    fn test_failed_check_is_not_serving() {
        let result = CheckResult::failed("Connection error: refused".to_string());
        assert_eq!(result.status, CheckStatus::Unhealthy);
        assert!(!result.is_serving());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert!(json.get("latency_ms").is_none());
    }
}
