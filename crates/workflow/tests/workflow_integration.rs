//! Integration tests for the order workflow engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use common::{RestaurantId, StaffId, TableId};
use domain::{
    Actor, CartItem, CreateOrderRequest, CustomerInfo, OrderStatus, UpdateOrderStatus,
    ValidationIssue,
};
use notifications::{InMemoryNotificationStore, NotificationKind, Recipient};
use order_store::{InMemoryOrderStore, OrderQuery, OrderStore, RetryPolicy, StoreError};
use realtime::Handlers;
use tokio::sync::mpsc;
use workflow::{
    AssignmentOutcome, InMemoryStaffDirectory, InMemoryTableReservationService, ServiceError,
    SideEffect, StaffDirectory, StaffMember, WorkflowConfig, WorkflowEngine, WorkflowError,
};

type TestEngine = WorkflowEngine<InMemoryOrderStore, InMemoryNotificationStore>;

struct TestHarness {
    engine: Arc<TestEngine>,
    store: InMemoryOrderStore,
    notifications: InMemoryNotificationStore,
    directory: InMemoryStaffDirectory,
    reservations: InMemoryTableReservationService,
    restaurant: RestaurantId,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryOrderStore::new();
        let notifications = InMemoryNotificationStore::new();
        let directory = InMemoryStaffDirectory::new();
        let reservations = InMemoryTableReservationService::new();
        let config = WorkflowConfig::default()
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1), 2.0));

        let engine = WorkflowEngine::builder(store.clone(), notifications.clone())
            .config(config)
            .staff_directory(Arc::new(directory.clone()))
            .reservations(Arc::new(reservations.clone()))
            .build();

        Self {
            engine: Arc::new(engine),
            store,
            notifications,
            directory,
            reservations,
            restaurant: RestaurantId::new(),
        }
    }

    async fn hire(&self, name: &str) -> StaffId {
        self.directory
            .add(StaffMember::new(self.restaurant, name))
            .await
    }

    fn customer_request(&self) -> CreateOrderRequest {
        CreateOrderRequest::from_customer(
            self.restaurant,
            TableId::new(),
            vec![CartItem::new("pizza", "Margherita", 100.0, 2)],
            CustomerInfo::new("Maya", "555-0101"),
        )
    }

    async fn owner_kinds(&self) -> Vec<&'static str> {
        self.notifications
            .all()
            .await
            .into_iter()
            .filter(|n| n.recipient == Recipient::Owner(self.restaurant))
            .map(|n| n.kind.as_str())
            .collect()
    }
}

#[tokio::test]
async fn totals_for_two_items_at_one_hundred() {
    let h = TestHarness::new();
    h.hire("Ana").await;

    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    let order = placed.order;
    assert!((order.subtotal.amount() - 200.0).abs() <= 1e-6);
    assert!((order.platform_fee.amount() - 3.0).abs() <= 1e-6);
    assert!((order.total.amount() - 203.0).abs() <= 1e-6);
    assert!(domain::is_valid_order_number(&order.order_number));
}

#[tokio::test]
async fn empty_cart_never_reaches_persistence() {
    let h = TestHarness::new();
    // Any store call would fail; validation must stop first.
    h.store.set_unavailable(true);

    let mut request = h.customer_request();
    request.cart.clear();
    let err = h.engine.create_order(request).await.unwrap_err();

    match err {
        WorkflowError::Validation(errors) => {
            assert!(errors.contains(&ValidationIssue::EmptyCart));
            assert!(errors.to_string().contains("Cart cannot be empty"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    h.store.set_unavailable(false);
    assert_eq!(h.store.order_count().await, 0);
    assert_eq!(h.store.session_count().await, 0);
    assert_eq!(h.reservations.reservation_count().await, 0);
}

#[tokio::test]
async fn every_validation_failure_is_reported() {
    let h = TestHarness::new();
    let request = CreateOrderRequest {
        restaurant_id: None,
        table_id: None,
        cart: vec![],
        customer: CustomerInfo::new(" ", ""),
        ..h.customer_request()
    };

    let Err(WorkflowError::Validation(errors)) = h.engine.create_order(request).await else {
        panic!("expected validation error");
    };
    assert_eq!(errors.len(), 5);
}

#[tokio::test]
async fn concurrent_accepts_have_exactly_one_winner() {
    let h = TestHarness::new();
    let staff = h.hire("Ana").await;
    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    assert_eq!(placed.assignment, AssignmentOutcome::Assigned(staff));
    let order_id = placed.order.id;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let engine = h.engine.clone();
        tasks.push(tokio::spawn(
            async move { engine.accept_order(order_id, staff).await },
        ));
    }

    let mut accepted = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.status, OrderStatus::Accepted);
                accepted += 1;
            }
            Err(WorkflowError::Conflict { current_status, .. }) => {
                assert_eq!(current_status, OrderStatus::Accepted);
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!((accepted, conflicts), (1, 1));
}

#[tokio::test]
async fn second_accept_is_a_conflict() {
    let h = TestHarness::new();
    let staff = h.hire("Ana").await;
    let placed = h.engine.create_order(h.customer_request()).await.unwrap();

    h.engine.accept_order(placed.order.id, staff).await.unwrap();
    let err = h
        .engine
        .accept_order(placed.order.id, staff)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, WorkflowError::Conflict { .. }));
}

#[tokio::test]
async fn accept_unknown_order_is_not_found() {
    let h = TestHarness::new();
    let err = h
        .engine
        .accept_order(common::OrderId::new(), StaffId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));
}

#[tokio::test]
async fn rejection_reassigns_to_someone_else() {
    let h = TestHarness::new();
    let ana = h.hire("Ana").await;
    let ben = h.hire("Ben").await;
    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    assert_eq!(placed.order.assigned_staff_id, Some(ana));

    let order = h
        .engine
        .reject_order(placed.order.id, ana, "On break")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Assigned);
    assert_eq!(order.assigned_staff_id, Some(ben));
    assert_eq!(order.rejection_reason.as_deref(), Some("On break"));

    let ben_inbox = h
        .engine
        .notifications()
        .list(Recipient::Staff(ben), None)
        .await
        .unwrap();
    assert!(ben_inbox.iter().any(|n| matches!(
        n.kind,
        NotificationKind::OrderAssigned {
            reassignment: true,
            ..
        }
    )));
}

#[tokio::test]
async fn rejection_with_nobody_left_stays_pending() {
    let h = TestHarness::new();
    let ana = h.hire("Ana").await;
    let placed = h.engine.create_order(h.customer_request()).await.unwrap();

    let order = h
        .engine
        .reject_order(placed.order.id, ana, "Too busy")
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.assigned_staff_id, None);

    let kinds = h.owner_kinds().await;
    assert!(kinds.contains(&"order_rejected"));
    assert_eq!(kinds.iter().filter(|k| **k == "no_staff_available").count(), 1);
}

/// Staff directory that breaks the order store once it has answered
/// `healthy_lookups` times, so the following assignment write fails.
struct StoreBreakingDirectory {
    inner: InMemoryStaffDirectory,
    store: InMemoryOrderStore,
    healthy_lookups: usize,
    lookups: AtomicUsize,
}

#[async_trait]
impl StaffDirectory for StoreBreakingDirectory {
    async fn staff_for(&self, restaurant_id: RestaurantId) -> Result<Vec<StaffMember>, ServiceError> {
        if self.lookups.fetch_add(1, Ordering::SeqCst) >= self.healthy_lookups {
            self.store.set_fail_next(10);
        }
        self.inner.staff_for(restaurant_id).await
    }
}

fn engine_with_breaking_directory(
    store: &InMemoryOrderStore,
    notifications: &InMemoryNotificationStore,
    directory: &InMemoryStaffDirectory,
    healthy_lookups: usize,
) -> TestEngine {
    WorkflowEngine::builder(store.clone(), notifications.clone())
        .config(
            WorkflowConfig::default().with_retry(RetryPolicy::new(3, Duration::from_millis(1), 2.0)),
        )
        .staff_directory(Arc::new(StoreBreakingDirectory {
            inner: directory.clone(),
            store: store.clone(),
            healthy_lookups,
            lookups: AtomicUsize::new(0),
        }))
        .build()
}

fn no_staff_alerts(all: &[notifications::NotificationRecord], restaurant: RestaurantId) -> usize {
    all.iter()
        .filter(|n| n.recipient == Recipient::Owner(restaurant))
        .filter(|n| n.kind.as_str() == "no_staff_available")
        .count()
}

#[tokio::test]
async fn failed_reassignment_leaves_order_pending_and_alerts_owner() {
    let h = TestHarness::new();
    let ana = h.hire("Ana").await;
    h.hire("Ben").await;
    let engine = engine_with_breaking_directory(&h.store, &h.notifications, &h.directory, 1);

    let placed = engine.create_order(h.customer_request()).await.unwrap();
    assert_eq!(placed.order.assigned_staff_id, Some(ana));

    let order = engine
        .reject_order(placed.order.id, ana, "On break")
        .await
        .unwrap();
    h.store.set_fail_next(0);

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.assigned_staff_id, None);

    let stored = h.store.get_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.assigned_staff_id, None);

    let all = h.notifications.all().await;
    assert_eq!(no_staff_alerts(&all, h.restaurant), 1);
}

#[tokio::test]
async fn failed_initial_assignment_alerts_owner() {
    let h = TestHarness::new();
    h.hire("Ana").await;
    let engine = engine_with_breaking_directory(&h.store, &h.notifications, &h.directory, 0);

    let placed = engine.create_order(h.customer_request()).await.unwrap();
    h.store.set_fail_next(0);

    assert_eq!(placed.assignment, AssignmentOutcome::Failed);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert!(placed.warnings.iter().any(|w| w.effect == SideEffect::Assignment));

    let all = h.notifications.all().await;
    assert_eq!(no_staff_alerts(&all, h.restaurant), 1);
}

#[tokio::test]
async fn stale_rejection_is_a_conflict() {
    let h = TestHarness::new();
    let ana = h.hire("Ana").await;
    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    h.engine.accept_order(placed.order.id, ana).await.unwrap();

    let err = h
        .engine
        .reject_order(placed.order.id, ana, "Changed my mind")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Conflict {
            current_status: OrderStatus::Accepted,
            ..
        }
    ));
}

#[tokio::test]
async fn staff_assisted_order_keeps_its_staff() {
    let h = TestHarness::new();
    h.hire("Ana").await;
    let waiter = StaffId::new();
    let request = CreateOrderRequest::from_staff(
        waiter,
        h.restaurant,
        TableId::new(),
        vec![CartItem::new("soup", "Soup", 6.5, 1)],
        CustomerInfo::new("Walk-in", "555-0199"),
    );

    let placed = h.engine.create_order(request).await.unwrap();
    assert_eq!(placed.assignment, AssignmentOutcome::NotRequired);
    assert_eq!(placed.order.status, OrderStatus::Assigned);
    assert_eq!(placed.order.assigned_staff_id, Some(waiter));
    assert!(placed.session.created_by_staff);
    assert_eq!(placed.session.staff_id, Some(waiter));

    let kinds = h.owner_kinds().await;
    assert_eq!(kinds, vec!["new_order"]);
}

#[tokio::test]
async fn no_staff_means_pending_and_one_owner_alert() {
    let h = TestHarness::new();
    let placed = h.engine.create_order(h.customer_request()).await.unwrap();

    assert_eq!(placed.assignment, AssignmentOutcome::NoStaffAvailable);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.assigned_staff_id, None);

    let alerts: Vec<_> = h
        .notifications
        .all()
        .await
        .into_iter()
        .filter(|n| matches!(n.kind, NotificationKind::NoStaffAvailable { .. }))
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].recipient, Recipient::Owner(h.restaurant));
    assert_eq!(alerts[0].priority, notifications::Priority::Urgent);
}

#[tokio::test]
async fn unavailable_staff_directory_counts_as_nobody() {
    let h = TestHarness::new();
    h.hire("Ana").await;
    h.directory.set_unavailable(true);

    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    assert_eq!(placed.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn notification_failures_do_not_fail_the_order() {
    let h = TestHarness::new();
    h.hire("Ana").await;
    h.notifications.set_unavailable(true);

    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    assert_eq!(placed.order.status, OrderStatus::Assigned);
    assert!(placed
        .warnings
        .iter()
        .any(|w| w.effect == SideEffect::Notifications));
}

#[tokio::test]
async fn transient_store_failures_are_retried() {
    let h = TestHarness::new();
    h.hire("Ana").await;
    h.store.set_fail_next(2);

    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    assert_eq!(placed.order.status, OrderStatus::Assigned);
}

#[tokio::test]
async fn store_outage_surfaces_as_persistence_error() {
    let h = TestHarness::new();
    h.store.set_unavailable(true);

    let err = h
        .engine
        .create_order(h.customer_request())
        .await
        .unwrap_err();
    assert!(!err.is_caller_correctable());
    assert!(matches!(
        err,
        WorkflowError::Persistence(StoreError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(h.reservations.reservation_count().await, 0);
}

#[tokio::test]
async fn offer_usage_is_recorded_with_the_order() {
    let h = TestHarness::new();
    let request = h.customer_request().with_offer("WELCOME10", 10.0);

    let placed = h.engine.create_order(request).await.unwrap();
    assert!((placed.order.total.amount() - 193.0).abs() <= 1e-6);

    let usage = h
        .engine
        .store()
        .get_offer_usage(placed.order.id)
        .await
        .unwrap()
        .expect("offer usage recorded");
    assert_eq!(usage.offer_id, "WELCOME10");
    assert_eq!(usage.session_id, Some(placed.session.id));
}

#[tokio::test]
async fn staff_subscription_sees_assignment() {
    let h = TestHarness::new();
    let ana = h.hire("Ana").await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = h.engine.subscribe_staff(
        ana,
        Handlers::new().on_event(move |event| {
            let _ = tx.send(event.event.clone());
        }),
    );

    h.engine.create_order(h.customer_request()).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(event, "order_assigned");
    h.engine.close();
}

#[tokio::test]
async fn status_updates_notify_the_customer_session() {
    let h = TestHarness::new();
    let ana = h.hire("Ana").await;
    let placed = h.engine.create_order(h.customer_request()).await.unwrap();
    let id = placed.order.id;
    h.engine.accept_order(id, ana).await.unwrap();

    h.engine
        .update_order_status(UpdateOrderStatus::new(
            id,
            OrderStatus::Preparing,
            Actor::Staff(ana),
        ))
        .await
        .unwrap();

    let inbox = h
        .engine
        .notifications()
        .list(Recipient::Customer(placed.session.id), None)
        .await
        .unwrap();
    // Newest first.
    assert!(matches!(
        inbox[0].kind,
        NotificationKind::OrderStatusUpdate {
            status: OrderStatus::Preparing,
            ..
        }
    ));

    let preparing = h
        .engine
        .list_orders(&OrderQuery::for_restaurant(h.restaurant).status(OrderStatus::Preparing))
        .await
        .unwrap();
    assert_eq!(preparing.len(), 1);
}
