//! HTTP API handlers
//!
//! Each handler receives a request (validated by Axum extractors), delegates
//! to the scoring context or the registry, and returns JSON or an `AppError`.

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ridescore_core::{DataSource, Feature, FeatureView};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tower_http::timeout::TimeoutLayer;
use tracing::instrument;

use crate::config::ServerConfig;
use crate::error::{AppError, Result};
use crate::scoring::ScoreOutcome;
use crate::state::AppState;
use crate::{health, metrics, request_id};

/// Build the router with all routes and middleware
///
/// Layers apply bottom to top: the timeout wraps everything else.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(export_metrics))
        .route("/score", post(score))
        .route("/v1/feature-views", get(list_feature_views))
        .route("/v1/feature-views/:name", get(get_feature_view))
        .route_layer(axum::middleware::from_fn(request_id::metrics_middleware))
        .with_state(state)
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
}

// ============================================================================
// Scoring
// ============================================================================

/// Score one entity-key row
///
/// ## Endpoint
/// `POST /score`
///
/// ## Request Body
/// ```json
/// { "driver": 17, "customer_id": 42 }
/// ```
///
/// ## Response
/// `[1]` when every feature was present, `0` when any was missing.
pub async fn score(
    State(state): State<AppState>,
    body: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<ScoreOutcome>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let serde_json::Value::Object(request) = body else {
        return Err(AppError::BadRequest(
            "request body must be a JSON object of entity keys".to_string(),
        ));
    };

    let outcome = state.context().score(&request).await?;
    Ok(Json(outcome))
}

// ============================================================================
// Registry (read-only)
// ============================================================================

/// Query parameters for listing feature views
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Optional filter by name substring
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListFeatureViewsResponse {
    pub project: String,
    pub feature_views: Vec<FeatureViewResponse>,
    pub count: usize,
}

/// Feature view in API response format
#[derive(Debug, Serialize)]
pub struct FeatureViewResponse {
    pub name: String,
    pub entities: Vec<String>,
    pub features: Vec<Feature>,
    pub source: DataSource,
    pub ttl_seconds: i64,
    pub tags: Vec<String>,
}

impl From<FeatureView> for FeatureViewResponse {
    fn from(view: FeatureView) -> Self {
        Self {
            name: view.name,
            entities: view.entities,
            features: view.features,
            source: view.source,
            ttl_seconds: view.ttl_seconds,
            tags: view.tags,
        }
    }
}

/// List registered feature views
///
/// ## Endpoint
/// `GET /v1/feature-views?filter=driver`
#[instrument(skip(state), fields(filter = ?params.filter))]
pub async fn list_feature_views(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListFeatureViewsResponse>> {
    let start = Instant::now();
    let views = state
        .context()
        .registry()
        .list_feature_views(params.filter.as_deref())
        .await
        .map_err(|e| AppError::Internal(format!("Failed to list feature views: {:#}", e)))?;
    metrics::record_registry_query("list_feature_views", start.elapsed().as_secs_f64());

    let feature_views: Vec<FeatureViewResponse> =
        views.into_iter().map(FeatureViewResponse::from).collect();

    Ok(Json(ListFeatureViewsResponse {
        project: state.context().snapshot().project.clone(),
        count: feature_views.len(),
        feature_views,
    }))
}

/// Get a feature view by name
///
/// ## Endpoint
/// `GET /v1/feature-views/:name`
#[instrument(skip(state), fields(feature_view = %name))]
pub async fn get_feature_view(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FeatureViewResponse>> {
    let start = Instant::now();
    let view = state
        .context()
        .registry()
        .get_feature_view(&name)
        .await
        .map_err(|e| AppError::NotFound(format!("Feature view '{}' not found: {:#}", name, e)))?;
    metrics::record_registry_query("get_feature_view", start.elapsed().as_secs_f64());

    Ok(Json(FeatureViewResponse::from(view)))
}

// ============================================================================
// Metrics
// ============================================================================

/// Prometheus scrape endpoint
///
/// ## Endpoint
/// `GET /metrics`
pub async fn export_metrics() -> Response {
    match metrics::export_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => AppError::Internal(format!("Failed to export metrics: {}", e)).into_response(),
    }
}
