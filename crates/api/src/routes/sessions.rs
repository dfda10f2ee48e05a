//! Customer session endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::SessionId;
use domain::{Actor, CustomerSession};
use notifications::NotificationStore;
use order_store::OrderStore;
use serde::Deserialize;

use super::orders::AppState;
use super::parse_id;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub released_by: Actor,
}

/// POST /sessions/{id}/release — ends the visit and frees the table.
///
/// Releasing an already ended session returns it unchanged.
#[tracing::instrument(skip(state, req))]
pub async fn release<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<CustomerSession>, ApiError> {
    let session_id: SessionId = parse_id(&id, "session id")?;
    let session = state
        .engine
        .release_table(session_id, req.released_by)
        .await?;
    Ok(Json(session))
}
