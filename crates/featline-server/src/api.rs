//! HTTP API handlers
//!
//! ## Endpoints
//!
//! - `GET /health` - liveness plus online store and registry status
//! - `GET /v1/info` - static server identification
//! - `POST /v1/features/online` - online feature retrieval
//! - `GET /metrics` - Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use featline_core::EntityRow;
use featline_serving::{
    FeatureSelection, RetrievalRequest, RetrievalResponse, ServingInfo, SERVING_INFO,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::{
    error::{AppError, Result},
    state::AppState,
};

// ============================================================================
// Health Check
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy", or "degraded" when the online store does not answer
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub online_store: StoreHealth,
    pub registry_version: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreHealth {
    #[serde(rename = "type")]
    pub store_type: String,
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Health check endpoint
///
/// `GET /health`
///
/// ```json
/// {
///   "status": "healthy",
///   "uptime_seconds": 123,
///   "version": "0.1.0",
///   "online_store": { "type": "redis", "healthy": true },
///   "registry_version": 7
/// }
/// ```
///
/// Returns 503 when the online store health check fails or times out.
pub async fn health(State(state): State<AppState>) -> Response {
    let engine = state.engine();
    let store = engine.store();

    let check = tokio::time::timeout(state.request_timeout(), store.health_check()).await;
    let (healthy, message) = match check {
        Ok(Ok(())) => (true, None),
        Ok(Err(e)) => (false, Some(e.to_string())),
        Err(_) => (false, Some("health check timed out".to_string())),
    };
    if let Some(message) = &message {
        tracing::warn!(store = store.store_type(), "Online store unhealthy: {}", message);
    }

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        uptime_seconds: state.uptime(),
        version: SERVING_INFO.version.to_string(),
        online_store: StoreHealth {
            store_type: store.store_type().to_string(),
            healthy,
            message,
        },
        registry_version: engine.registry().snapshot().version(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

/// `GET /v1/info`
pub async fn info() -> Json<ServingInfo> {
    Json(SERVING_INFO)
}

// ============================================================================
// Online Features
// ============================================================================

/// Request body of `POST /v1/features/online`
///
/// Exactly one of `features` and `feature_service` must be given.
///
/// ```json
/// {
///   "project": "rides",
///   "entity_rows": [{"driver_id": 1001}, {"driver_id": 1002}],
///   "features": ["driver_stats:conv_rate", "driver_stats:acc_rate"],
///   "full_feature_names": false
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineFeaturesRequest {
    pub project: String,

    #[serde(default)]
    pub entity_rows: Vec<EntityRow>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_service: Option<String>,

    #[serde(default)]
    pub full_feature_names: bool,
}

impl TryFrom<OnlineFeaturesRequest> for RetrievalRequest {
    type Error = AppError;

    fn try_from(body: OnlineFeaturesRequest) -> Result<Self> {
        let features = match (body.features, body.feature_service) {
            (Some(features), None) => FeatureSelection::Features(features),
            (None, Some(service)) => FeatureSelection::FeatureService(service),
            (Some(_), Some(_)) => {
                return Err(AppError::BadRequest(
                    "specify either 'features' or 'feature_service', not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(AppError::BadRequest(
                    "one of 'features' or 'feature_service' is required".to_string(),
                ))
            }
        };

        Ok(RetrievalRequest {
            project: body.project,
            entity_rows: body.entity_rows,
            features,
            full_feature_names: body.full_feature_names,
        })
    }
}

/// Online feature retrieval
///
/// `POST /v1/features/online`
///
/// The call runs under the configured request timeout and is cancelled when
/// the server shuts down. The response carries one vector per requested
/// feature, each aligned with `entity_rows`:
///
/// ```json
/// {
///   "metadata": { "feature_names": ["conv_rate"] },
///   "results": [
///     {
///       "name": "conv_rate",
///       "values": [
///         {"value": 0.5, "status": "PRESENT", "event_timestamp": "2024-06-01T11:55:00Z"},
///         {"value": null, "status": "NOT_FOUND"}
///       ]
///     }
///   ]
/// }
/// ```
pub async fn get_online_features(
    State(state): State<AppState>,
    body: std::result::Result<Json<OnlineFeaturesRequest>, JsonRejection>,
) -> Result<Json<RetrievalResponse>> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let request = RetrievalRequest::try_from(body)?;

    let start = Instant::now();
    let ctx = state.call_context();
    let result = state.engine().get_online_features(&ctx, &request).await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(response) => {
            crate::metrics::record_online_success(&response, elapsed);
            tracing::debug!(
                project = %request.project,
                rows = response.num_rows(),
                features = response.results.len(),
                latency_ms = elapsed * 1000.0,
                "Handled online features request"
            );
            Ok(Json(response))
        }
        Err(err) => {
            crate::metrics::record_online_failure(err.category().as_str(), elapsed);
            Err(err.into())
        }
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// `GET /metrics` in Prometheus text format
pub async fn metrics() -> Response {
    match crate::metrics::export_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => AppError::Internal(format!("Failed to export metrics: {}", e)).into_response(),
    }
}
