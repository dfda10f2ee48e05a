//! Notification inbox endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::NotificationId;
use notifications::{NotificationRecord, NotificationStore, Recipient};
use order_store::OrderStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::orders::AppState;
use super::parse_id;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct InboxParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct InboxResponse {
    pub unread: usize,
    pub notifications: Vec<NotificationRecord>,
}

#[derive(Serialize)]
pub struct MarkAllReadResponse {
    pub marked: usize,
}

fn recipient(recipient_type: &str, id: &str) -> Result<Recipient, ApiError> {
    Ok(Recipient::from_parts(
        recipient_type,
        parse_id::<Uuid>(id, "recipient id")?,
    )?)
}

/// GET /notifications/{recipient_type}/{id} — newest first, with the unread count.
#[tracing::instrument(skip(state, params))]
pub async fn inbox<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path((recipient_type, id)): Path<(String, String)>,
    Query(params): Query<InboxParams>,
) -> Result<Json<InboxResponse>, ApiError> {
    let recipient = recipient(&recipient_type, &id)?;
    let fanout = state.engine.notifications();
    let notifications = fanout.list(recipient, params.limit).await?;
    let unread = fanout.unread_count(recipient).await?;
    Ok(Json(InboxResponse {
        unread,
        notifications,
    }))
}

/// POST /notifications/{id}/read
#[tracing::instrument(skip(state))]
pub async fn mark_read<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<NotificationRecord>, ApiError> {
    let notification_id: NotificationId = parse_id(&id, "notification id")?;
    let record = state.engine.notifications().mark_read(notification_id).await?;
    Ok(Json(record))
}

/// POST /notifications/{recipient_type}/{id}/read-all
#[tracing::instrument(skip(state))]
pub async fn mark_all_read<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path((recipient_type, id)): Path<(String, String)>,
) -> Result<Json<MarkAllReadResponse>, ApiError> {
    let recipient = recipient(&recipient_type, &id)?;
    let marked = state.engine.notifications().mark_all_read(recipient).await?;
    Ok(Json(MarkAllReadResponse { marked }))
}
