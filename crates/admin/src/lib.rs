//! Operational HTTP surface for the lifecycle manager.
//!
//! Provides endpoints for:
//! - Per-kind utilization metrics (JSON) and the Prometheus scrape
//! - Manual cleanup, bypassing the queue
//! - Queue introspection and manual enqueue
//!
//! Authentication is left to whatever sits in front of this router.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use lifecycle_core::{
    types::{CleanupPriority, CleanupTarget, CleanupTask, ResourceKind, ResourceMetrics},
    Error,
};
use lifecycle_manager::LifecycleManager;

/// Admin API state.
pub struct AdminState {
    pub manager: Arc<LifecycleManager>,
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

// =============================================================================
// Payloads
// =============================================================================

/// One kind in the `GET /metrics` response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindMetrics {
    pub total_items: u64,
    pub size_mb: f64,
    /// Percent of the soft limit, e.g. `90.0`.
    pub usage_percentage: f64,
    pub cleanup_priority: CleanupPriority,
    pub oldest_age_hours: f64,
}

impl From<&ResourceMetrics> for KindMetrics {
    fn from(m: &ResourceMetrics) -> Self {
        Self {
            total_items: m.total_items,
            size_mb: round2(m.size_mb()),
            usage_percentage: round2(m.usage_percentage * 100.0),
            cleanup_priority: m.priority,
            oldest_age_hours: round2(m.oldest_age_hours()),
        }
    }
}

/// Body of `POST /cleanup`. A missing or null kind cleans every kind.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    #[serde(default)]
    pub resource_kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted_counts: BTreeMap<ResourceKind, u64>,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<ResourceKind, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueResponse {
    pub queue_size: usize,
    pub tasks: Vec<CleanupTask>,
}

/// Body of `POST /queue`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub resource_kind: String,
    /// Resource id, or `"all"` / absent for a TTL sweep of the kind.
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub queued: bool,
    pub queue_size: usize,
}

// =============================================================================
// Errors
// =============================================================================

/// Lifecycle error rendered as `{ "error": message }`.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::StoreUnavailable { .. } | Error::TimedOut(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

fn parse_kind(raw: &str) -> Result<ResourceKind, ApiError> {
    Ok(raw.parse::<ResourceKind>()?)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Per-kind utilization. Kinds whose store cannot be sampled are absent.
async fn get_metrics(State(state): State<Arc<AdminState>>) -> Json<BTreeMap<ResourceKind, KindMetrics>> {
    let metrics = state.manager.get_metrics().await;
    Json(metrics.iter().map(|(kind, m)| (*kind, KindMetrics::from(m))).collect())
}

/// Prometheus text exposition.
async fn get_prometheus(State(state): State<Arc<AdminState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Synchronous TTL sweep of one kind or all kinds.
async fn trigger_cleanup(
    State(state): State<Arc<AdminState>>,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let kind = request.resource_kind.as_deref().map(parse_kind).transpose()?;

    let outcomes = state.manager.trigger_cleanup(kind).await;

    let mut deleted_counts = BTreeMap::new();
    let mut errors = BTreeMap::new();
    for (kind, outcome) in outcomes {
        deleted_counts.insert(kind, outcome.deleted);
        if let Some(error) = outcome.error {
            errors.insert(kind, error);
        }
    }

    let total: u64 = deleted_counts.values().sum();
    let message = if errors.is_empty() {
        format!("Deleted {} expired items", total)
    } else {
        let failed: Vec<&str> = errors.keys().map(|k| k.as_str()).collect();
        format!("Deleted {} expired items; cleanup failed for {}", total, failed.join(", "))
    };

    tracing::info!(deleted = total, failed = errors.len(), "Manual cleanup finished");

    Ok(Json(CleanupResponse {
        success: errors.is_empty(),
        deleted_counts,
        message,
        errors,
    }))
}

/// Pending tasks, most urgent first.
async fn get_queue(State(state): State<Arc<AdminState>>) -> Json<QueueResponse> {
    let tasks = state.manager.queue_snapshot();
    Json(QueueResponse {
        queue_size: tasks.len(),
        tasks,
    })
}

/// Queue a cleanup task by hand.
async fn enqueue(
    State(state): State<Arc<AdminState>>,
    Json(request): Json<EnqueueRequest>,
) -> Result<Json<EnqueueResponse>, ApiError> {
    let kind = parse_kind(&request.resource_kind)?;
    let priority = match request.priority.as_deref() {
        Some(raw) => raw.parse::<CleanupPriority>()?,
        None => CleanupPriority::Medium,
    };
    let target = request.target_id.map(CleanupTarget::from).unwrap_or(CleanupTarget::All);
    let reason = request.reason.unwrap_or_else(|| "manual".to_string());

    let queued = state
        .manager
        .schedule_cleanup(CleanupTask::new(kind, target, priority, reason))?;

    Ok(Json(EnqueueResponse {
        queued,
        queue_size: state.manager.queue_size(),
    }))
}

/// Build the admin API router.
pub fn admin_router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .route("/metrics/prometheus", get(get_prometheus))
        .route("/cleanup", post(trigger_cleanup))
        .route("/queue", get(get_queue).post(enqueue))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(87.3456), 87.35);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_kind_metrics_payload() {
        let m = ResourceMetrics {
            kind: ResourceKind::EphemeralCache,
            total_items: 90,
            size_bytes: 3 * 1024 * 1024,
            usage_percentage: 0.9,
            priority: CleanupPriority::Critical,
            oldest_item_age_seconds: 5400,
        };
        let value = serde_json::to_value(KindMetrics::from(&m)).unwrap();

        assert_eq!(value["totalItems"], 90);
        assert_eq!(value["sizeMb"], 3.0);
        assert_eq!(value["usagePercentage"], 90.0);
        assert_eq!(value["cleanupPriority"], "CRITICAL");
        assert_eq!(value["oldestAgeHours"], 1.5);
    }
}
