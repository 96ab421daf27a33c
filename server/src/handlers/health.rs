//! Health and metrics endpoints.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use topout_runtime::{HealthCheck, HealthStatus};

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthBody {
    /// Component checked
    pub component: String,
    /// `healthy` or `unhealthy`
    pub status: String,
    /// Detail when not healthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Counters reported by the component
    pub metadata: BTreeMap<String, String>,
}

impl From<HealthCheck> for HealthBody {
    fn from(check: HealthCheck) -> Self {
        Self {
            component: check.component,
            status: check.status.to_string(),
            message: check.message,
            metadata: check.metadata.into_iter().collect(),
        }
    }
}

/// Liveness with live-feed counters.
///
/// 200 while healthy, 503 when unhealthy.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthBody>) {
    let check = state.hub.health().await;
    let status = match check.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(check.into()))
}

/// Prometheus text exposition.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .render()
        .ok_or_else(|| AppError::unavailable("metrics recorder is not installed"))
}
