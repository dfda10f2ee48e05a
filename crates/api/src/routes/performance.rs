//! Operation analytics endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Query, State};
use monitor::Analytics;
use notifications::NotificationStore;
use order_store::OrderStore;
use serde::Deserialize;

use super::orders::AppState;

const DEFAULT_WINDOW_SECS: u64 = 3600;

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsParams {
    pub window_secs: Option<u64>,
}

/// GET /performance?window_secs=N — aggregates for operations finished in the window.
pub async fn analytics<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Query(params): Query<AnalyticsParams>,
) -> Json<Analytics> {
    let window = Duration::from_secs(params.window_secs.unwrap_or(DEFAULT_WINDOW_SECS));
    Json(state.engine.monitor().get_analytics(window).await)
}
