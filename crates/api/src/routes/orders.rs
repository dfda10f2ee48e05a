//! Order placement and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, RestaurantId, SessionId, StaffId};
use domain::{Actor, CreateOrderRequest, Order, OrderStatus, UpdateOrderStatus};
use notifications::NotificationStore;
use order_store::{OrderQuery, OrderStore};
use serde::Deserialize;
use workflow::{OrderDetails, PlacedOrder, WorkflowEngine};

use super::parse_id;
use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: OrderStore, N: NotificationStore> {
    pub engine: WorkflowEngine<S, N>,
}

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AcceptRequest {
    pub staff_id: StaffId,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub staff_id: StaffId,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub staff_id: Option<StaffId>,
    pub updated_by: Actor,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
    pub cancelled_by: Actor,
}

/// Query string for listing a restaurant's orders.
///
/// `status` takes a comma separated list, e.g. `?status=pending,assigned`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub staff_id: Option<String>,
    pub session_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListParams {
    fn into_query(self, restaurant_id: RestaurantId) -> Result<OrderQuery, ApiError> {
        let mut query = OrderQuery::for_restaurant(restaurant_id);

        if let Some(raw) = self.status.as_deref() {
            let statuses = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| s.parse::<OrderStatus>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            query = query.statuses(statuses);
        }
        if let Some(raw) = self.staff_id.as_deref() {
            query = query.assigned_to(parse_id::<StaffId>(raw, "staff_id")?);
        }
        if let Some(raw) = self.session_id.as_deref() {
            query.session_id = Some(parse_id::<SessionId>(raw, "session_id")?);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        Ok(query)
    }
}

// -- Handlers --

/// POST /orders — place an order from a customer or staff cart.
#[tracing::instrument(skip(state, req), fields(source = ?req.source))]
pub async fn create<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let placed = state.engine.create_order(req).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

/// GET /orders/{id} — order with items, queue entry and session.
#[tracing::instrument(skip(state))]
pub async fn get<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetails>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    Ok(Json(state.engine.get_order(order_id).await?))
}

/// GET /restaurants/{id}/orders — filtered listing, newest first.
#[tracing::instrument(skip(state, params))]
pub async fn list<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let restaurant_id: RestaurantId = parse_id(&id, "restaurant id")?;
    let query = params.into_query(restaurant_id)?;
    Ok(Json(state.engine.list_orders(&query).await?))
}

/// POST /orders/{id}/accept
#[tracing::instrument(skip(state, req))]
pub async fn accept<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    Ok(Json(state.engine.accept_order(order_id, req.staff_id).await?))
}

/// POST /orders/{id}/reject — hands the order back for reassignment.
#[tracing::instrument(skip(state, req))]
pub async fn reject<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let reason = req
        .reason
        .unwrap_or_else(|| "Rejected by staff".to_string());
    let order = state
        .engine
        .reject_order(order_id, req.staff_id, reason)
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/status
#[tracing::instrument(skip(state, req), fields(status = %req.status))]
pub async fn update_status<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let command = UpdateOrderStatus {
        order_id,
        status: req.status,
        staff_id: req.staff_id,
        updated_by: req.updated_by,
        reason: req.reason,
    };
    Ok(Json(state.engine.update_order_status(command).await?))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip(state, req))]
pub async fn cancel<S: OrderStore + 'static, N: NotificationStore + 'static>(
    State(state): State<Arc<AppState<S, N>>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order id")?;
    let order = state
        .engine
        .cancel_order(order_id, req.reason, req.cancelled_by)
        .await?;
    Ok(Json(order))
}
