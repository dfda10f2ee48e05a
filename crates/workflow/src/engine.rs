//! Order workflow engine.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, RestaurantId, SessionId, StaffId, TableId};
use domain::{
    Actor, CreateOrderRequest, CustomerSession, DomainEvent, Order, OrderEvent, OrderGuard,
    OrderItem, OrderPatch, OrderSource, OrderStatus, OrderType, PaymentStatus, QueueEntry,
    UpdateOrderStatus, ValidationIssue, generate_order_number, validate_order,
};
use monitor::PerformanceMonitor;
use notifications::{FanoutReport, NotificationFanout, NotificationStore};
use order_store::{
    ChangeFeed, ConditionalUpdate, CreatedOrder, NewOrder, OfferUsage, OrderGateway, OrderQuery,
    OrderStore, StoreError,
};
use realtime::{Handlers, RealtimeConfig, RealtimeHub, SubscriptionHandle};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::assignment::{AssignmentOutcome, AssignmentResolver};
use crate::config::WorkflowConfig;
use crate::error::{Result, WorkflowError};
use crate::services::{
    InMemoryLoyaltyService, InMemoryStaffDirectory, InMemoryTableReservationService,
    LoyaltyService, ReservationRequest, StaffDirectory, TableReservationService,
};

/// A best-effort step of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    TableReservation,
    LoyaltyPoints,
    Notifications,
    Assignment,
}

impl SideEffect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SideEffect::TableReservation => "table_reservation",
            SideEffect::LoyaltyPoints => "loyalty_points",
            SideEffect::Notifications => "notifications",
            SideEffect::Assignment => "assignment",
        }
    }
}

/// A best-effort step that failed without failing the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffectWarning {
    pub effect: SideEffect,
    pub message: String,
}

impl SideEffectWarning {
    fn new(effect: SideEffect, message: impl ToString) -> Self {
        metrics::counter!("side_effect_failures_total", "effect" => effect.as_str()).increment(1);
        Self {
            effect,
            message: message.to_string(),
        }
    }
}

/// Result of [`WorkflowEngine::create_order`].
#[derive(Debug, Clone, Serialize)]
pub struct PlacedOrder {
    /// The order after assignment.
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub queue_entry: QueueEntry,
    pub session: CustomerSession,
    pub assignment: AssignmentOutcome,
    /// Best-effort steps that failed.
    pub warnings: Vec<SideEffectWarning>,
}

/// An order with everything it owns.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub queue_entry: Option<QueueEntry>,
    pub session: Option<CustomerSession>,
}

fn conflict(order: &Order, reason: impl Into<String>) -> WorkflowError {
    WorkflowError::Conflict {
        order_id: order.id,
        current_status: order.status,
        reason: reason.into(),
    }
}

fn record_transition(to: OrderStatus) {
    metrics::counter!("order_status_transitions_total", "to" => to.as_str()).increment(1);
}

/// Drives orders through their lifecycle.
///
/// Every order mutation is a conditional update on the order's status and
/// staff assignment; there is no in-process lock. Notification fan-out and
/// realtime publication run after each successful transition and never
/// fail the operation.
pub struct WorkflowEngine<S, N>
where
    S: OrderStore,
    N: NotificationStore,
{
    config: WorkflowConfig,
    store: OrderGateway<S>,
    fanout: NotificationFanout<N>,
    realtime: RealtimeHub,
    monitor: PerformanceMonitor,
    assignment: AssignmentResolver,
    reservations: Arc<dyn TableReservationService>,
    loyalty: Arc<dyn LoyaltyService>,
}

/// Builder for [`WorkflowEngine`]. Collaborators default to the in-memory
/// implementations.
pub struct WorkflowEngineBuilder<S, N> {
    store: S,
    notifications: N,
    config: WorkflowConfig,
    staff: Arc<dyn StaffDirectory>,
    reservations: Arc<dyn TableReservationService>,
    loyalty: Arc<dyn LoyaltyService>,
    realtime: Option<RealtimeHub>,
    monitor: Option<PerformanceMonitor>,
}

impl<S, N> WorkflowEngineBuilder<S, N>
where
    S: OrderStore,
    N: NotificationStore,
{
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn staff_directory(mut self, directory: Arc<dyn StaffDirectory>) -> Self {
        self.staff = directory;
        self
    }

    pub fn reservations(mut self, reservations: Arc<dyn TableReservationService>) -> Self {
        self.reservations = reservations;
        self
    }

    pub fn loyalty(mut self, loyalty: Arc<dyn LoyaltyService>) -> Self {
        self.loyalty = loyalty;
        self
    }

    /// Uses `hub` for realtime publication. The store's change feed is
    /// wired to the hub's feed.
    pub fn realtime(mut self, hub: RealtimeHub) -> Self {
        self.realtime = Some(hub);
        self
    }

    pub fn monitor(mut self, monitor: PerformanceMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn build(self) -> WorkflowEngine<S, N> {
        let realtime = self
            .realtime
            .unwrap_or_else(|| RealtimeHub::new(RealtimeConfig::default(), ChangeFeed::default()));
        let store = OrderGateway::new(self.store, self.config.retry)
            .with_change_feed(realtime.changes().clone());

        WorkflowEngine {
            config: self.config,
            store,
            fanout: NotificationFanout::new(self.notifications),
            realtime,
            monitor: self.monitor.unwrap_or_default(),
            assignment: AssignmentResolver::new(self.staff),
            reservations: self.reservations,
            loyalty: self.loyalty,
        }
    }
}

impl<S, N> WorkflowEngine<S, N>
where
    S: OrderStore,
    N: NotificationStore,
{
    /// Starts building an engine over an order store and a notification store.
    pub fn builder(store: S, notifications: N) -> WorkflowEngineBuilder<S, N> {
        WorkflowEngineBuilder {
            store,
            notifications,
            config: WorkflowConfig::default(),
            staff: Arc::new(InMemoryStaffDirectory::new()),
            reservations: Arc::new(InMemoryTableReservationService::new()),
            loyalty: Arc::new(InMemoryLoyaltyService::new()),
            realtime: None,
            monitor: None,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn store(&self) -> &OrderGateway<S> {
        &self.store
    }

    pub fn notifications(&self) -> &NotificationFanout<N> {
        &self.fanout
    }

    pub fn realtime(&self) -> &RealtimeHub {
        &self.realtime
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    // -- Commands --

    /// Validates, persists and assigns a new order.
    ///
    /// Customer orders are auto-assigned; staff-assisted orders keep the
    /// staff member who placed them. Table reservation, loyalty points and
    /// notifications are best-effort and reported in
    /// [`PlacedOrder::warnings`].
    #[tracing::instrument(skip(self, request), fields(source = ?request.source))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<PlacedOrder> {
        let metadata = json!({
            "source": request.source,
            "restaurant_id": request.restaurant_id,
            "items": request.cart.len(),
        });
        self.monitor
            .track("create_order", metadata, self.place_order(request))
            .await
    }

    /// Accepts an order on behalf of the staff member it is assigned to.
    #[tracing::instrument(skip(self))]
    pub async fn accept_order(&self, order_id: OrderId, staff_id: StaffId) -> Result<Order> {
        let metadata = json!({ "order_id": order_id, "staff_id": staff_id });
        self.monitor
            .track("accept_order", metadata, self.accept(order_id, staff_id))
            .await
    }

    /// Returns an order to the queue and tries to hand it to someone else.
    ///
    /// The rejecting staff member is never picked again by the same call.
    /// If nobody else is available the order stays `pending`.
    #[tracing::instrument(skip(self, reason))]
    pub async fn reject_order(
        &self,
        order_id: OrderId,
        staff_id: StaffId,
        reason: impl Into<String>,
    ) -> Result<Order> {
        let reason = reason.into();
        let metadata = json!({ "order_id": order_id, "staff_id": staff_id });
        self.monitor
            .track("reject_order", metadata, self.reject(order_id, staff_id, reason))
            .await
    }

    /// Moves an order to a status reachable from its current one.
    #[tracing::instrument(skip(self, command), fields(order_id = %command.order_id, to = %command.status))]
    pub async fn update_order_status(&self, command: UpdateOrderStatus) -> Result<Order> {
        let metadata = json!({
            "order_id": command.order_id,
            "status": command.status,
            "updated_by": command.updated_by,
        });
        self.monitor
            .track("update_order_status", metadata, self.update_status(command))
            .await
    }

    /// Cancels a non-terminal order.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        reason: Option<String>,
        actor: Actor,
    ) -> Result<Order> {
        let metadata = json!({ "order_id": order_id, "actor": actor });
        self.monitor
            .track("cancel_order", metadata, async {
                let current = self.require_order(order_id).await?;
                self.ensure_staff_owns(&current, actor)?;
                current
                    .status
                    .ensure_transition(OrderStatus::Cancelled)
                    .map_err(|_| WorkflowError::InvalidTransition {
                        from: current.status,
                        to: OrderStatus::Cancelled,
                    })?;
                self.cancel(current, reason, actor).await
            })
            .await
    }

    /// Ends a dining session and frees its table.
    ///
    /// Releasing a session that already ended returns it unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn release_table(&self, session_id: SessionId, actor: Actor) -> Result<CustomerSession> {
        let metadata = json!({ "session_id": session_id, "actor": actor });
        self.monitor
            .track("release_table", metadata, self.release(session_id, actor))
            .await
    }

    /// Picks an available staff member for the restaurant, if any.
    pub async fn auto_assign_staff(&self, restaurant_id: RestaurantId) -> Option<StaffId> {
        self.assignment.auto_assign_staff(restaurant_id, &[]).await
    }

    // -- Queries --

    pub async fn get_order(&self, order_id: OrderId) -> Result<OrderDetails> {
        let order = self.require_order(order_id).await?;
        let items = self.store.get_order_items(order_id).await?;
        let queue_entry = self.store.get_queue_entry(order_id).await?;
        let session = match order.session_id {
            Some(session_id) => self.store.get_session(session_id).await?,
            None => None,
        };
        Ok(OrderDetails {
            order,
            items,
            queue_entry,
            session,
        })
    }

    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        Ok(self.store.query_orders(query).await?)
    }

    // -- Realtime --

    pub fn subscribe_session(&self, session_id: SessionId, handlers: Handlers) -> SubscriptionHandle {
        self.realtime.subscribe_session(session_id, handlers)
    }

    pub fn subscribe_staff(&self, staff_id: StaffId, handlers: Handlers) -> SubscriptionHandle {
        self.realtime.subscribe_staff(staff_id, handlers)
    }

    pub fn subscribe_restaurant(
        &self,
        restaurant_id: RestaurantId,
        handlers: Handlers,
    ) -> SubscriptionHandle {
        self.realtime.subscribe_restaurant(restaurant_id, handlers)
    }

    /// Tears down every realtime subscription.
    pub fn close(&self) {
        self.realtime.close();
    }

    // -- Steps --

    async fn place_order(&self, request: CreateOrderRequest) -> Result<PlacedOrder> {
        let totals = validate_order(&request, self.config.platform_fee_rate)?;
        let restaurant_id = request
            .restaurant_id
            .ok_or_else(|| WorkflowError::Validation(ValidationIssue::MissingRestaurant.into()))?;
        let table_id = request
            .table_id
            .ok_or_else(|| WorkflowError::Validation(ValidationIssue::MissingTable.into()))?;
        let initiating_staff = match request.source {
            OrderSource::Customer => None,
            OrderSource::Staff => Some(
                request
                    .staff_id
                    .ok_or_else(|| WorkflowError::Validation(ValidationIssue::MissingStaff.into()))?,
            ),
        };

        let session = self
            .resolve_session(&request, restaurant_id, table_id, initiating_staff)
            .await?;

        let now = Utc::now();
        let order_id = OrderId::new();
        let order = Order {
            id: order_id,
            restaurant_id,
            table_id,
            session_id: Some(session.id),
            customer_id: request.customer.customer_id,
            order_number: String::new(),
            status: if initiating_staff.is_some() {
                OrderStatus::Assigned
            } else {
                OrderStatus::Pending
            },
            order_type: OrderType::from(request.source),
            subtotal: totals.subtotal,
            platform_fee: totals.platform_fee,
            tip: totals.tip,
            discount: totals.discount,
            total: totals.total,
            payment_method: request.payment_method,
            payment_status: PaymentStatus::Pending,
            assigned_staff_id: initiating_staff,
            special_instructions: request.special_instructions.clone(),
            rejection_reason: None,
            cancellation_reason: None,
            created_at: now,
            assigned_at: initiating_staff.map(|_| now),
            started_at: None,
            ready_at: None,
            completed_at: None,
            cancelled_at: None,
            updated_at: now,
        };
        let items = request
            .cart
            .iter()
            .map(|item| OrderItem::from_cart(order_id, item))
            .collect();
        let offer_usage = request.offer.as_ref().map(|offer| OfferUsage {
            offer_id: offer.offer_id.clone(),
            order_id,
            restaurant_id,
            session_id: Some(session.id),
            customer_id: request.customer.customer_id,
            discount: offer.discount,
            used_at: now,
        });

        let created = self.insert_order(order, items, offer_usage).await?;
        metrics::counter!("orders_created_total", "order_type" => created.order.order_type.as_str())
            .increment(1);
        tracing::info!(
            order_id = %created.order.id,
            order_number = %created.order.order_number,
            queue_position = created.queue_entry.position,
            "Order created"
        );

        let mut warnings = Vec::new();
        let mut notified = self
            .dispatch(OrderEvent::order_created(
                &created.order,
                request.source,
                created.items.len(),
            ))
            .await;

        let reservation = ReservationRequest {
            restaurant_id,
            table_id,
            session_id: session.id,
            contact: request.customer.clone(),
        };
        if let Err(e) = self.reservations.reserve(&reservation).await {
            tracing::warn!(order_id = %order_id, %table_id, error = %e, "Table reservation failed");
            warnings.push(SideEffectWarning::new(SideEffect::TableReservation, e));
        }

        if let Some(customer_id) = created.order.customer_id {
            match self
                .loyalty
                .award_points(customer_id, restaurant_id, order_id, created.order.total)
                .await
            {
                Ok(award) => {
                    tracing::debug!(order_id = %order_id, points = award.points, "Loyalty points awarded")
                }
                Err(e) => {
                    tracing::warn!(order_id = %order_id, error = %e, "Loyalty points not awarded");
                    warnings.push(SideEffectWarning::new(SideEffect::LoyaltyPoints, e));
                }
            }
        }

        let CreatedOrder {
            order,
            items,
            queue_entry,
        } = created;
        let (order, assignment) = if initiating_staff.is_some() {
            (order, AssignmentOutcome::NotRequired)
        } else {
            let fallback = order.clone();
            match self.assign_pending(order, &[], false).await {
                Ok((order, outcome, report)) => {
                    notified += report;
                    (order, outcome)
                }
                Err(e) => {
                    tracing::error!(order_id = %order_id, error = %e, "Assignment failed, order stays pending");
                    warnings.push(SideEffectWarning::new(SideEffect::Assignment, e));
                    notified += self.assignment_failed(&fallback).await;
                    (fallback, AssignmentOutcome::Failed)
                }
            }
        };

        if notified.failed > 0 {
            warnings.push(SideEffectWarning::new(
                SideEffect::Notifications,
                format!("{} notification(s) could not be written", notified.failed),
            ));
        }

        Ok(PlacedOrder {
            order,
            items,
            queue_entry,
            session,
            assignment,
            warnings,
        })
    }

    /// Reuses the requested session, else the table's active session, else
    /// opens a new one.
    async fn resolve_session(
        &self,
        request: &CreateOrderRequest,
        restaurant_id: RestaurantId,
        table_id: TableId,
        initiating_staff: Option<StaffId>,
    ) -> Result<CustomerSession> {
        if let Some(session_id) = request.session_id {
            match self.store.get_session(session_id).await? {
                Some(session)
                    if session.is_active()
                        && session.restaurant_id == restaurant_id
                        && session.table_id == table_id =>
                {
                    return Ok(session);
                }
                Some(_) => {
                    tracing::debug!(%session_id, "Requested session is closed or at another table")
                }
                None => tracing::debug!(%session_id, "Requested session does not exist"),
            }
        }

        if let Some(session) = self.store.find_active_session(restaurant_id, table_id).await? {
            return Ok(session);
        }

        let session = match initiating_staff {
            Some(staff_id) => {
                CustomerSession::open_by_staff(restaurant_id, table_id, &request.customer, staff_id)
            }
            None => CustomerSession::open(restaurant_id, table_id, &request.customer),
        };
        Ok(self.store.create_session(session).await?)
    }

    /// Persists the order, regenerating its number on a collision.
    async fn insert_order(
        &self,
        mut order: Order,
        items: Vec<OrderItem>,
        offer_usage: Option<OfferUsage>,
    ) -> Result<CreatedOrder> {
        let attempts = self.config.order_number_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            order.order_number = generate_order_number(Utc::now());
            let new_order =
                NewOrder::new(order.clone(), items.clone()).with_offer_usage(offer_usage.clone());
            match self.store.create_order(new_order).await {
                Err(StoreError::Duplicate { order_number, .. }) if attempt < attempts => {
                    tracing::warn!(%order_number, attempt, "Order number collision, regenerating");
                }
                result => return Ok(result?),
            }
        }
    }

    /// Assigns a pending order to the first qualifying staff member.
    async fn assign_pending(
        &self,
        order: Order,
        exclude: &[StaffId],
        reassignment: bool,
    ) -> Result<(Order, AssignmentOutcome, FanoutReport)> {
        let Some(staff_id) = self
            .assignment
            .auto_assign_staff(order.restaurant_id, exclude)
            .await
        else {
            metrics::counter!("orders_unassigned_total").increment(1);
            tracing::warn!(order_id = %order.id, "No staff available, order stays pending");
            let report = self.dispatch(OrderEvent::no_staff_available(&order)).await;
            return Ok((order, AssignmentOutcome::NoStaffAvailable, report));
        };

        match self
            .store
            .update_order_if(
                order.id,
                &OrderGuard::unassigned_pending(),
                &OrderPatch::assign(staff_id, Utc::now()),
            )
            .await?
        {
            ConditionalUpdate::Applied(assigned) => {
                record_transition(OrderStatus::Assigned);
                if reassignment {
                    metrics::counter!("orders_reassigned_total").increment(1);
                }
                tracing::info!(order_id = %assigned.id, %staff_id, reassignment, "Order assigned");
                let report = self
                    .dispatch(OrderEvent::order_assigned(&assigned, staff_id, reassignment))
                    .await;
                Ok((assigned, AssignmentOutcome::Assigned(staff_id), report))
            }
            ConditionalUpdate::ConditionFailed(current) => {
                tracing::debug!(order_id = %current.id, status = %current.status, "Order changed before assignment");
                Ok((current, AssignmentOutcome::Superseded, FanoutReport::default()))
            }
            ConditionalUpdate::NotFound => Err(WorkflowError::NotFound(order.id)),
        }
    }

    async fn accept(&self, order_id: OrderId, staff_id: StaffId) -> Result<Order> {
        match self
            .store
            .update_order_if(
                order_id,
                &OrderGuard::assigned_to(staff_id),
                &OrderPatch::transition(OrderStatus::Accepted, Utc::now()),
            )
            .await?
        {
            ConditionalUpdate::Applied(order) => {
                metrics::counter!("orders_accepted_total").increment(1);
                record_transition(OrderStatus::Accepted);
                tracing::info!(%order_id, %staff_id, "Order accepted");
                self.dispatch(OrderEvent::order_accepted(&order, staff_id))
                    .await;
                Ok(order)
            }
            ConditionalUpdate::ConditionFailed(current) => Err(conflict(
                &current,
                format!("order is not awaiting acceptance by staff {staff_id}"),
            )),
            ConditionalUpdate::NotFound => Err(WorkflowError::NotFound(order_id)),
        }
    }

    async fn reject(&self, order_id: OrderId, staff_id: StaffId, reason: String) -> Result<Order> {
        let pending = match self
            .store
            .update_order_if(
                order_id,
                &OrderGuard::assigned_to(staff_id),
                &OrderPatch::reject(reason.clone(), Utc::now()),
            )
            .await?
        {
            ConditionalUpdate::Applied(order) => order,
            ConditionalUpdate::ConditionFailed(current) => {
                return Err(conflict(
                    &current,
                    format!("order is not awaiting acceptance by staff {staff_id}"),
                ));
            }
            ConditionalUpdate::NotFound => return Err(WorkflowError::NotFound(order_id)),
        };

        metrics::counter!("orders_rejected_total").increment(1);
        record_transition(OrderStatus::Pending);
        tracing::info!(%order_id, %staff_id, %reason, "Order rejected");
        self.dispatch(OrderEvent::order_rejected(&pending, staff_id, reason))
            .await;

        // The rejection is committed; from here the order must end up either
        // reassigned or pending with the owner alerted.
        match self.assign_pending(pending.clone(), &[staff_id], true).await {
            Ok((order, _, _)) => Ok(order),
            Err(e) => {
                tracing::error!(%order_id, error = %e, "Reassignment failed, order stays pending");
                metrics::counter!("side_effect_failures_total", "effect" => SideEffect::Assignment.as_str())
                    .increment(1);
                self.assignment_failed(&pending).await;
                Ok(pending)
            }
        }
    }

    /// Alerts the owner that a pending order has nobody assigned after the
    /// assignment write failed.
    async fn assignment_failed(&self, order: &Order) -> FanoutReport {
        metrics::counter!("orders_unassigned_total").increment(1);
        self.dispatch(OrderEvent::no_staff_available(order)).await
    }

    async fn update_status(&self, command: UpdateOrderStatus) -> Result<Order> {
        let current = self.require_order(command.order_id).await?;
        let (from, to) = (current.status, command.status);
        from.ensure_transition(to)
            .map_err(|_| WorkflowError::InvalidTransition { from, to })?;
        if from != OrderStatus::Pending {
            self.ensure_staff_owns(&current, command.updated_by)?;
        }

        match to {
            OrderStatus::Assigned => {
                let staff_id = command
                    .staff_id
                    .or(command.updated_by.staff_id())
                    .ok_or_else(|| WorkflowError::Validation(ValidationIssue::MissingStaff.into()))?;
                self.assign_manually(command.order_id, staff_id).await
            }
            OrderStatus::Pending => {
                let staff_id = current
                    .assigned_staff_id
                    .ok_or_else(|| conflict(&current, "order has no assigned staff"))?;
                let reason = command
                    .reason
                    .unwrap_or_else(|| format!("Returned to the queue by {}", command.updated_by));
                self.reject(command.order_id, staff_id, reason).await
            }
            OrderStatus::Accepted => {
                let staff_id = current
                    .assigned_staff_id
                    .ok_or_else(|| conflict(&current, "order has no assigned staff"))?;
                self.accept(command.order_id, staff_id).await
            }
            OrderStatus::Cancelled => self.cancel(current, command.reason, command.updated_by).await,
            _ => self.transition(current, to, command.updated_by).await,
        }
    }

    async fn assign_manually(&self, order_id: OrderId, staff_id: StaffId) -> Result<Order> {
        match self
            .store
            .update_order_if(
                order_id,
                &OrderGuard::unassigned_pending(),
                &OrderPatch::assign(staff_id, Utc::now()),
            )
            .await?
        {
            ConditionalUpdate::Applied(order) => {
                record_transition(OrderStatus::Assigned);
                tracing::info!(%order_id, %staff_id, "Order assigned manually");
                self.dispatch(OrderEvent::order_assigned(&order, staff_id, false))
                    .await;
                Ok(order)
            }
            ConditionalUpdate::ConditionFailed(current) => {
                Err(conflict(&current, "order is no longer pending"))
            }
            ConditionalUpdate::NotFound => Err(WorkflowError::NotFound(order_id)),
        }
    }

    async fn transition(&self, current: Order, to: OrderStatus, actor: Actor) -> Result<Order> {
        let from = current.status;
        match self
            .store
            .update_order_if(
                current.id,
                &OrderGuard::observed(&current),
                &OrderPatch::transition(to, Utc::now()),
            )
            .await?
        {
            ConditionalUpdate::Applied(order) => {
                record_transition(to);
                tracing::info!(order_id = %order.id, %from, %to, %actor, "Order status changed");
                self.dispatch(OrderEvent::status_changed(&order, from, actor))
                    .await;
                Ok(order)
            }
            ConditionalUpdate::ConditionFailed(latest) => Err(conflict(
                &latest,
                format!("order changed while moving from {from} to {to}"),
            )),
            ConditionalUpdate::NotFound => Err(WorkflowError::NotFound(current.id)),
        }
    }

    async fn cancel(&self, current: Order, reason: Option<String>, actor: Actor) -> Result<Order> {
        let from = current.status;
        match self
            .store
            .update_order_if(
                current.id,
                &OrderGuard::observed(&current),
                &OrderPatch::transition(OrderStatus::Cancelled, Utc::now())
                    .with_cancellation_reason(reason),
            )
            .await?
        {
            ConditionalUpdate::Applied(order) => {
                record_transition(OrderStatus::Cancelled);
                tracing::info!(order_id = %order.id, %from, %actor, "Order cancelled");
                self.dispatch(OrderEvent::order_cancelled(&order, from, actor))
                    .await;
                Ok(order)
            }
            ConditionalUpdate::ConditionFailed(latest) => {
                Err(conflict(&latest, "order changed before it could be cancelled"))
            }
            ConditionalUpdate::NotFound => Err(WorkflowError::NotFound(current.id)),
        }
    }

    async fn release(&self, session_id: SessionId, actor: Actor) -> Result<CustomerSession> {
        let session = self
            .store
            .get_session(session_id)
            .await?
            .ok_or(WorkflowError::SessionNotFound(session_id))?;
        if !session.is_active() {
            tracing::debug!(%session_id, "Session already ended");
            return Ok(session);
        }

        let session = self
            .store
            .complete_session(session_id, Utc::now())
            .await?
            .ok_or(WorkflowError::SessionNotFound(session_id))?;

        if let Err(e) = self
            .reservations
            .release(session.restaurant_id, session.table_id, session_id)
            .await
        {
            metrics::counter!("side_effect_failures_total", "effect" => SideEffect::TableReservation.as_str())
                .increment(1);
            tracing::warn!(%session_id, table_id = %session.table_id, error = %e, "Table release failed");
        }

        tracing::info!(%session_id, table_id = %session.table_id, %actor, "Table released");
        self.dispatch(OrderEvent::table_released(
            session.restaurant_id,
            session.table_id,
            session_id,
            actor,
        ))
        .await;
        Ok(session)
    }

    // -- Helpers --

    async fn require_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(WorkflowError::NotFound(order_id))
    }

    /// Staff may only move orders assigned to them.
    fn ensure_staff_owns(&self, order: &Order, actor: Actor) -> Result<()> {
        match actor {
            Actor::Staff(staff_id) if !order.is_assigned_to(staff_id) => Err(conflict(
                order,
                format!("order is not assigned to staff {staff_id}"),
            )),
            _ => Ok(()),
        }
    }

    /// Writes notifications, then publishes the event on its realtime channels.
    async fn dispatch(&self, event: OrderEvent) -> FanoutReport {
        let report = self.fanout.fan_out(&event).await;
        let delivered = self.realtime.publish_event(&event);
        tracing::debug!(
            event_type = event.event_type(),
            notifications = report.written,
            realtime_receivers = delivered,
            "Event dispatched"
        );
        report
    }
}
