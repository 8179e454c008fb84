use axum::{extract::State, Json};
use dockhand_core::metrics::HostMetrics;

use crate::error::AppError;
use crate::state::{lock, AppState};

/// GET /api/health
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = app.registry.snapshot();
    let active_runs = lock(&app.runs).active();
    let mut body = serde_json::json!({
        "status": "ok",
        "policy_version": app.policy.current().version,
        "units": snapshot.units.len(),
        "refreshed_at": snapshot.refreshed_at,
        "active_runs": active_runs,
    });
    if let Some(metrics) = &app.metrics {
        body["metrics"] = serde_json::to_value(metrics.latest()).unwrap_or_default();
    }
    Json(body)
}

/// GET /api/metrics: the latest host sample, taking one if none exists yet.
pub async fn host_metrics(State(app): State<AppState>) -> Result<Json<HostMetrics>, AppError> {
    let Some(metrics) = &app.metrics else {
        return Err(AppError::not_found("host metrics are disabled"));
    };
    if let Some(latest) = metrics.latest() {
        return Ok(Json(latest));
    }
    metrics
        .refresh()
        .await
        .map(Json)
        .map_err(|e| AppError::unavailable(format!("host metrics unavailable: {e}")))
}
