use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, RestaurantId, SessionId, TableId};
use domain::{CustomerSession, Order, OrderGuard, OrderItem, OrderPatch, QueueEntry};

use crate::{
    ChangeFeed, ChangeOp, OrderQuery, Result, RetryPolicy, RowChange, Table,
    store::{ConditionalUpdate, CreatedOrder, NewOrder, OfferUsage, OrderStore},
};

/// Persistence gateway: retries transient failures of the wrapped store and
/// publishes a [`RowChange`] for every successful write.
///
/// The gateway is itself an [`OrderStore`], so callers cannot tell it apart
/// from the backend it wraps.
pub struct OrderGateway<S> {
    store: S,
    retry: RetryPolicy,
    changes: ChangeFeed,
}

impl<S: OrderStore> OrderGateway<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            changes: ChangeFeed::default(),
        }
    }

    /// Publishes changes to `changes` instead of a private feed.
    pub fn with_change_feed(mut self, changes: ChangeFeed) -> Self {
        self.changes = changes;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    fn publish<T: serde::Serialize>(
        &self,
        table: Table,
        op: ChangeOp,
        row: &T,
        restaurant_id: Option<RestaurantId>,
    ) {
        match RowChange::new(table, op, row) {
            Ok(change) => {
                let change = match restaurant_id {
                    Some(id) => change.with_column("restaurant_id", id.to_string()),
                    None => change,
                };
                self.changes.publish(change);
            }
            Err(e) => tracing::warn!(table = %table, error = %e, "Failed to encode row change"),
        }
    }

    fn publish_created(&self, created: &CreatedOrder, offer_usage: Option<&OfferUsage>) {
        let restaurant_id = created.order.restaurant_id;
        self.publish(Table::Orders, ChangeOp::Insert, &created.order, None);
        for item in &created.items {
            self.publish(Table::OrderItems, ChangeOp::Insert, item, Some(restaurant_id));
        }
        self.publish(Table::OrderQueue, ChangeOp::Insert, &created.queue_entry, None);
        if let Some(usage) = offer_usage {
            self.publish(Table::OfferUsages, ChangeOp::Insert, usage, None);
        }
    }
}

#[async_trait]
impl<S: OrderStore> OrderStore for OrderGateway<S> {
    #[tracing::instrument(
        skip(self, new_order),
        fields(order_id = %new_order.order.id, order_number = %new_order.order.order_number)
    )]
    async fn create_order(&self, new_order: NewOrder) -> Result<CreatedOrder> {
        let offer_usage = new_order.offer_usage.clone();
        let created = self
            .retry
            .run("create_order", || self.store.create_order(new_order.clone()))
            .await?;
        self.publish_created(&created, offer_usage.as_ref());
        Ok(created)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.retry
            .run("get_order", || self.store.get_order(order_id))
            .await
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        self.retry
            .run("get_order_items", || self.store.get_order_items(order_id))
            .await
    }

    async fn get_queue_entry(&self, order_id: OrderId) -> Result<Option<QueueEntry>> {
        self.retry
            .run("get_queue_entry", || self.store.get_queue_entry(order_id))
            .await
    }

    #[tracing::instrument(skip(self, guard, patch), fields(order_id = %order_id))]
    async fn update_order_if(
        &self,
        order_id: OrderId,
        guard: &OrderGuard,
        patch: &OrderPatch,
    ) -> Result<ConditionalUpdate> {
        let outcome = self
            .retry
            .run("update_order_if", || {
                self.store.update_order_if(order_id, guard, patch)
            })
            .await?;
        if let ConditionalUpdate::Applied(order) = &outcome {
            self.publish(Table::Orders, ChangeOp::Update, order, None);
        }
        Ok(outcome)
    }

    async fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        self.retry
            .run("query_orders", || self.store.query_orders(query))
            .await
    }

    #[tracing::instrument(skip(self, session), fields(session_id = %session.id))]
    async fn create_session(&self, session: CustomerSession) -> Result<CustomerSession> {
        let created = self
            .retry
            .run("create_session", || self.store.create_session(session.clone()))
            .await?;
        self.publish(Table::CustomerSessions, ChangeOp::Insert, &created, None);
        Ok(created)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<CustomerSession>> {
        self.retry
            .run("get_session", || self.store.get_session(session_id))
            .await
    }

    async fn find_active_session(
        &self,
        restaurant_id: RestaurantId,
        table_id: TableId,
    ) -> Result<Option<CustomerSession>> {
        self.retry
            .run("find_active_session", || {
                self.store.find_active_session(restaurant_id, table_id)
            })
            .await
    }

    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    async fn complete_session(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<CustomerSession>> {
        let session = self
            .retry
            .run("complete_session", || {
                self.store.complete_session(session_id, ended_at)
            })
            .await?;
        if let Some(session) = &session {
            self.publish(Table::CustomerSessions, ChangeOp::Update, session, None);
        }
        Ok(session)
    }

    async fn get_offer_usage(&self, order_id: OrderId) -> Result<Option<OfferUsage>> {
        self.retry
            .run("get_offer_usage", || self.store.get_offer_usage(order_id))
            .await
    }
}
