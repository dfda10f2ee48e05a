use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, RestaurantId, SessionId, TableId};
use domain::{
    CustomerSession, DEFAULT_ESTIMATED_WAIT_MINUTES, Money, Order, OrderGuard, OrderItem,
    OrderPatch, QueueEntry, QueuePriority,
};
use serde::{Deserialize, Serialize};

use crate::{OrderQuery, Result, StoreError};

/// Record that a discount offer was consumed by an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferUsage {
    pub offer_id: String,
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub session_id: Option<SessionId>,
    pub customer_id: Option<CustomerId>,
    pub discount: Money,
    pub used_at: DateTime<Utc>,
}

/// Queue parameters for a new order. The position is assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRequest {
    pub priority: QueuePriority,
    pub estimated_wait_minutes: u32,
}

impl Default for QueueRequest {
    fn default() -> Self {
        Self {
            priority: QueuePriority::Normal,
            estimated_wait_minutes: DEFAULT_ESTIMATED_WAIT_MINUTES,
        }
    }
}

/// Everything written atomically when an order is created.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub queue: QueueRequest,
    pub offer_usage: Option<OfferUsage>,
}

impl NewOrder {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            order,
            items,
            queue: QueueRequest::default(),
            offer_usage: None,
        }
    }

    pub fn with_queue(mut self, queue: QueueRequest) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_offer_usage(mut self, usage: Option<OfferUsage>) -> Self {
        self.offer_usage = usage;
        self
    }
}

/// The rows produced by a successful [`OrderStore::create_order`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedOrder {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub queue_entry: QueueEntry,
}

/// Outcome of a compare-and-set update.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalUpdate {
    /// The guard matched and the patch was applied; holds the updated order.
    Applied(Order),
    /// The order exists but no longer matches the guard; holds its current state.
    ConditionFailed(Order),
    /// No order with that id exists.
    NotFound,
}

impl ConditionalUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, ConditionalUpdate::Applied(_))
    }

    /// Returns the updated order if the patch was applied.
    pub fn applied(self) -> Option<Order> {
        match self {
            ConditionalUpdate::Applied(order) => Some(order),
            _ => None,
        }
    }
}

/// Core trait for order store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order with its items, queue entry and offer usage.
    ///
    /// The write is atomic: either every row exists afterwards or none does.
    /// Fails with [`StoreError::Duplicate`] if the order number is already
    /// used within the restaurant.
    async fn create_order(&self, new_order: NewOrder) -> Result<CreatedOrder>;

    /// Retrieves an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Retrieves the items of an order.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Retrieves the queue entry of an order.
    async fn get_queue_entry(&self, order_id: OrderId) -> Result<Option<QueueEntry>>;

    /// Applies `patch` only if the stored order still matches `guard`.
    ///
    /// This is the only way an order is mutated after creation.
    async fn update_order_if(
        &self,
        order_id: OrderId,
        guard: &OrderGuard,
        patch: &OrderPatch,
    ) -> Result<ConditionalUpdate>;

    /// Retrieves orders matching a query, newest first.
    async fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>>;

    /// Persists a new customer session.
    async fn create_session(&self, session: CustomerSession) -> Result<CustomerSession>;

    /// Retrieves a session by id.
    async fn get_session(&self, session_id: SessionId) -> Result<Option<CustomerSession>>;

    /// Retrieves the most recent active session at a table.
    async fn find_active_session(
        &self,
        restaurant_id: RestaurantId,
        table_id: TableId,
    ) -> Result<Option<CustomerSession>>;

    /// Marks a session completed. Completing a completed session is a no-op.
    ///
    /// Returns `None` if the session does not exist.
    async fn complete_session(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<CustomerSession>>;

    /// Retrieves the offer usage recorded for an order.
    async fn get_offer_usage(&self, order_id: OrderId) -> Result<Option<OfferUsage>>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Retrieves an order, failing with `NotFound` if it does not exist.
    async fn require_order(&self, order_id: OrderId) -> Result<Order> {
        self.get_order(order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Order", order_id))
    }

    /// Retrieves a session, failing with `NotFound` if it does not exist.
    async fn require_session(&self, session_id: SessionId) -> Result<CustomerSession> {
        self.get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Session", session_id))
    }
}

impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
