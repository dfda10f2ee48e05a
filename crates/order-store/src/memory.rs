use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, RestaurantId, SessionId, TableId};
use domain::{CustomerSession, Order, OrderGuard, OrderItem, OrderPatch, QueueEntry, SessionStatus};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError,
    store::{ConditionalUpdate, CreatedOrder, NewOrder, OfferUsage, OrderStore},
};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    queue: HashMap<OrderId, QueueEntry>,
    sessions: HashMap<SessionId, CustomerSession>,
    offer_usages: HashMap<OrderId, OfferUsage>,
}

/// In-memory order store implementation for testing.
///
/// Provides the same interface and atomicity as the PostgreSQL
/// implementation, plus switches to inject transient failures.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
    fail_next: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail with [`StoreError::Unavailable`].
    pub fn set_fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes every operation fail with [`StoreError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Returns the total number of sessions stored.
    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Clears every table.
    pub async fn clear(&self) {
        *self.tables.write().await = Tables::default();
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{operation}: store offline")));
        }
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable(format!("{operation}: injected failure")));
        }
        Ok(())
    }
}

fn next_queue_position(tables: &Tables, restaurant_id: RestaurantId) -> i64 {
    tables
        .queue
        .values()
        .filter(|entry| entry.restaurant_id == restaurant_id)
        .map(|entry| entry.position)
        .max()
        .unwrap_or(0)
        + 1
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, new_order: NewOrder) -> Result<CreatedOrder> {
        self.check_available("create_order")?;

        let NewOrder {
            order,
            items,
            queue,
            offer_usage,
        } = new_order;

        let mut tables = self.tables.write().await;

        let duplicate = tables.orders.contains_key(&order.id)
            || tables.orders.values().any(|existing| {
                existing.restaurant_id == order.restaurant_id
                    && existing.order_number == order.order_number
            });
        if duplicate {
            return Err(StoreError::Duplicate {
                restaurant_id: order.restaurant_id,
                order_number: order.order_number,
            });
        }

        let queue_entry = QueueEntry {
            order_id: order.id,
            restaurant_id: order.restaurant_id,
            position: next_queue_position(&tables, order.restaurant_id),
            priority: queue.priority,
            estimated_wait_minutes: queue.estimated_wait_minutes,
            created_at: order.created_at,
        };

        tables.orders.insert(order.id, order.clone());
        tables.items.insert(order.id, items.clone());
        tables.queue.insert(order.id, queue_entry.clone());
        if let Some(usage) = offer_usage {
            tables.offer_usages.insert(order.id, usage);
        }

        Ok(CreatedOrder {
            order,
            items,
            queue_entry,
        })
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.check_available("get_order")?;
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        self.check_available("get_order_items")?;
        Ok(self
            .tables
            .read()
            .await
            .items
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_queue_entry(&self, order_id: OrderId) -> Result<Option<QueueEntry>> {
        self.check_available("get_queue_entry")?;
        Ok(self.tables.read().await.queue.get(&order_id).cloned())
    }

    async fn update_order_if(
        &self,
        order_id: OrderId,
        guard: &OrderGuard,
        patch: &OrderPatch,
    ) -> Result<ConditionalUpdate> {
        self.check_available("update_order_if")?;

        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return Ok(ConditionalUpdate::NotFound);
        };
        if !guard.matches(order) {
            return Ok(ConditionalUpdate::ConditionFailed(order.clone()));
        }
        patch.apply_to(order);
        Ok(ConditionalUpdate::Applied(order.clone()))
    }

    async fn query_orders(&self, query: &OrderQuery) -> Result<Vec<Order>> {
        self.check_available("query_orders")?;

        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|order| query.matches(order))
            .cloned()
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }

    async fn create_session(&self, session: CustomerSession) -> Result<CustomerSession> {
        self.check_available("create_session")?;
        self.tables
            .write()
            .await
            .sessions
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Option<CustomerSession>> {
        self.check_available("get_session")?;
        Ok(self.tables.read().await.sessions.get(&session_id).cloned())
    }

    async fn find_active_session(
        &self,
        restaurant_id: RestaurantId,
        table_id: TableId,
    ) -> Result<Option<CustomerSession>> {
        self.check_available("find_active_session")?;
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.restaurant_id == restaurant_id && s.table_id == table_id && s.is_active())
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn complete_session(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<Option<CustomerSession>> {
        self.check_available("complete_session")?;

        let mut tables = self.tables.write().await;
        let Some(session) = tables.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        if session.is_active() {
            session.status = SessionStatus::Completed;
            session.ended_at = Some(ended_at);
        }
        Ok(Some(session.clone()))
    }

    async fn get_offer_usage(&self, order_id: OrderId) -> Result<Option<OfferUsage>> {
        self.check_available("get_offer_usage")?;
        Ok(self.tables.read().await.offer_usages.get(&order_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{RestaurantId, StaffId, TableId};
    use domain::{
        CartItem, CustomerInfo, Money, OrderStatus, OrderType, PaymentMethod, PaymentStatus,
        QueuePriority, generate_order_number,
    };

    use crate::store::{OrderStoreExt, QueueRequest};

    fn make_order(restaurant_id: RestaurantId) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            restaurant_id,
            table_id: TableId::new(),
            session_id: Some(SessionId::new()),
            customer_id: None,
            order_number: generate_order_number(now),
            status: OrderStatus::Pending,
            order_type: OrderType::DineIn,
            subtotal: Money::new(20.0),
            platform_fee: Money::new(0.3),
            tip: Money::zero(),
            discount: Money::zero(),
            total: Money::new(20.3),
            payment_method: PaymentMethod::Cash,
            payment_status: PaymentStatus::Pending,
            assigned_staff_id: None,
            special_instructions: None,
            rejection_reason: None,
            cancellation_reason: None,
            created_at: now,
            assigned_at: None,
            started_at: None,
            ready_at: None,
            completed_at: None,
            cancelled_at: None,
            updated_at: now,
        }
    }

    fn new_order(order: Order) -> NewOrder {
        let item = OrderItem::from_cart(order.id, &CartItem::new("soup", "Soup", 10.0, 2));
        NewOrder::new(order, vec![item])
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let store = InMemoryOrderStore::new();
        let order = make_order(RestaurantId::new());
        let order_id = order.id;

        let created = store.create_order(new_order(order)).await.unwrap();
        assert_eq!(created.queue_entry.position, 1);
        assert_eq!(created.queue_entry.priority, QueuePriority::Normal);

        let stored = store.require_order(order_id).await.unwrap();
        assert_eq!(stored, created.order);
        assert_eq!(store.get_order_items(order_id).await.unwrap().len(), 1);
        assert!(store.get_queue_entry(order_id).await.unwrap().is_some());
        assert!(store.get_offer_usage(order_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn queue_positions_increase_per_restaurant() {
        let store = InMemoryOrderStore::new();
        let r1 = RestaurantId::new();
        let r2 = RestaurantId::new();

        let a = store.create_order(new_order(make_order(r1))).await.unwrap();
        let b = store.create_order(new_order(make_order(r1))).await.unwrap();
        let c = store.create_order(new_order(make_order(r2))).await.unwrap();

        assert_eq!(a.queue_entry.position, 1);
        assert_eq!(b.queue_entry.position, 2);
        assert_eq!(c.queue_entry.position, 1);
    }

    #[tokio::test]
    async fn duplicate_order_number_is_rejected_atomically() {
        let store = InMemoryOrderStore::new();
        let restaurant = RestaurantId::new();
        let first = make_order(restaurant);
        let mut second = make_order(restaurant);
        second.order_number = first.order_number.clone();
        let second_id = second.id;

        store.create_order(new_order(first)).await.unwrap();
        let result = store.create_order(new_order(second)).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
        assert!(store.get_order(second_id).await.unwrap().is_none());
        assert!(store.get_queue_entry(second_id).await.unwrap().is_none());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn same_number_in_other_restaurant_is_allowed() {
        let store = InMemoryOrderStore::new();
        let first = make_order(RestaurantId::new());
        let mut second = make_order(RestaurantId::new());
        second.order_number = first.order_number.clone();

        store.create_order(new_order(first)).await.unwrap();
        assert!(store.create_order(new_order(second)).await.is_ok());
    }

    #[tokio::test]
    async fn offer_usage_is_stored_with_order() {
        let store = InMemoryOrderStore::new();
        let order = make_order(RestaurantId::new());
        let usage = OfferUsage {
            offer_id: "WELCOME".into(),
            order_id: order.id,
            restaurant_id: order.restaurant_id,
            session_id: order.session_id,
            customer_id: None,
            discount: Money::new(2.0),
            used_at: Utc::now(),
        };
        let order_id = order.id;
        store
            .create_order(
                new_order(order)
                    .with_offer_usage(Some(usage.clone()))
                    .with_queue(QueueRequest {
                        priority: QueuePriority::High,
                        estimated_wait_minutes: 5,
                    }),
            )
            .await
            .unwrap();

        assert_eq!(store.get_offer_usage(order_id).await.unwrap(), Some(usage));
        let entry = store.get_queue_entry(order_id).await.unwrap().unwrap();
        assert_eq!(entry.priority, QueuePriority::High);
        assert_eq!(entry.estimated_wait_minutes, 5);
    }

    #[tokio::test]
    async fn conditional_update_outcomes() {
        let store = InMemoryOrderStore::new();
        let order = make_order(RestaurantId::new());
        let order_id = order.id;
        store.create_order(new_order(order)).await.unwrap();

        let staff = StaffId::new();
        let assign = OrderPatch::assign(staff, Utc::now());
        let applied = store
            .update_order_if(order_id, &OrderGuard::unassigned_pending(), &assign)
            .await
            .unwrap();
        assert!(applied.is_applied());

        let again = store
            .update_order_if(order_id, &OrderGuard::unassigned_pending(), &assign)
            .await
            .unwrap();
        match again {
            ConditionalUpdate::ConditionFailed(current) => {
                assert_eq!(current.status, OrderStatus::Assigned);
                assert_eq!(current.assigned_staff_id, Some(staff));
            }
            other => panic!("expected condition failure, got {other:?}"),
        }

        let missing = store
            .update_order_if(OrderId::new(), &OrderGuard::unassigned_pending(), &assign)
            .await
            .unwrap();
        assert_eq!(missing, ConditionalUpdate::NotFound);
    }

    #[tokio::test]
    async fn concurrent_conditional_updates_have_one_winner() {
        let store = InMemoryOrderStore::new();
        let order = make_order(RestaurantId::new());
        let order_id = order.id;
        store.create_order(new_order(order)).await.unwrap();
        let staff = StaffId::new();
        store
            .update_order_if(
                order_id,
                &OrderGuard::unassigned_pending(),
                &OrderPatch::assign(staff, Utc::now()),
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_order_if(
                        order_id,
                        &OrderGuard::assigned_to(staff),
                        &OrderPatch::transition(OrderStatus::Accepted, Utc::now()),
                    )
                    .await
                    .unwrap()
                    .is_applied()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn query_filters_and_pages() {
        let store = InMemoryOrderStore::new();
        let restaurant = RestaurantId::new();
        for _ in 0..5 {
            store.create_order(new_order(make_order(restaurant))).await.unwrap();
        }
        store
            .create_order(new_order(make_order(RestaurantId::new())))
            .await
            .unwrap();

        let all = store
            .query_orders(&OrderQuery::for_restaurant(restaurant))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let page = store
            .query_orders(&OrderQuery::for_restaurant(restaurant).offset(1).limit(2))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, all[1].id);

        let assigned = store
            .query_orders(&OrderQuery::for_restaurant(restaurant).status(OrderStatus::Assigned))
            .await
            .unwrap();
        assert!(assigned.is_empty());
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let store = InMemoryOrderStore::new();
        let restaurant = RestaurantId::new();
        let table = TableId::new();
        let session = CustomerSession::open(restaurant, table, &CustomerInfo::new("Li", "555"));
        let session_id = session.id;
        store.create_session(session).await.unwrap();

        let active = store.find_active_session(restaurant, table).await.unwrap();
        assert_eq!(active.map(|s| s.id), Some(session_id));

        let ended_at = Utc::now();
        let completed = store
            .complete_session(session_id, ended_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);
        assert_eq!(completed.ended_at, Some(ended_at));

        let again = store
            .complete_session(session_id, ended_at + chrono::Duration::seconds(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.ended_at, Some(ended_at));

        assert!(store.find_active_session(restaurant, table).await.unwrap().is_none());
        assert!(store.complete_session(SessionId::new(), ended_at).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = InMemoryOrderStore::new();
        store.set_fail_next(2);
        assert!(matches!(
            store.get_order(OrderId::new()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get_order(OrderId::new()).await.is_err());
        assert!(store.get_order(OrderId::new()).await.is_ok());

        store.set_unavailable(true);
        assert!(store.order_count().await == 0);
        assert!(store.get_order(OrderId::new()).await.is_err());
        store.set_unavailable(false);
        assert!(store.get_order(OrderId::new()).await.is_ok());
    }
}
