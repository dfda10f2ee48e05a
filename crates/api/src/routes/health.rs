//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use monitor::HealthReport;
use notifications::NotificationStore;
use order_store::OrderStore;
use serde::Serialize;

use super::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub performance: HealthReport,
}

/// GET /health — liveness plus the monitor's view of recent operations.
///
/// Always answers 200 while the process serves requests; `status` turns to
/// `"degraded"` when the success rate or latency crosses its threshold.
pub async fn check<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
) -> Json<HealthResponse> {
    let performance = state.engine.monitor().check_health().await;
    let status = if performance.is_healthy() {
        "ok"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status,
        performance,
    })
}
