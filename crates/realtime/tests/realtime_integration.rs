//! Integration tests for realtime channels and change-feed subscriptions.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use common::{OrderId, RestaurantId, SessionId, StaffId, TableId};
use domain::{Actor, OrderEvent, OrderRef, OrderStatus};
use domain::order::{OrderAssignedData, OrderRejectedData};
use order_store::{ChangeFeed, ChangeFilter, ChangeOp, RowChange, Table};
use realtime::{Channel, Handlers, RealtimeConfig, RealtimeEvent, RealtimeHub};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn hub_with_feed() -> (RealtimeHub, ChangeFeed) {
    let feed = ChangeFeed::new(64);
    let hub = RealtimeHub::new(RealtimeConfig::default(), feed.clone());
    (hub, feed)
}

fn collecting_events() -> (Handlers, mpsc::UnboundedReceiver<RealtimeEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handlers = Handlers::new().on_event(move |event| {
        let _ = tx.send(event.clone());
    });
    (handlers, rx)
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn order_ref(restaurant_id: RestaurantId, session_id: Option<SessionId>) -> OrderRef {
    OrderRef {
        order_id: OrderId::new(),
        order_number: "ORD-1700000000000-ABC123".to_string(),
        restaurant_id,
        table_id: TableId::new(),
        session_id,
        assigned_staff_id: None,
        status: OrderStatus::Pending,
    }
}

#[tokio::test]
async fn events_on_one_channel_arrive_in_publish_order() {
    let (hub, _) = hub_with_feed();
    let restaurant = RestaurantId::new();
    let (handlers, mut rx) = collecting_events();
    let _handle = hub.subscribe_restaurant(restaurant, handlers);

    for i in 0..5 {
        hub.broadcast(&Channel::Restaurant(restaurant), "tick", json!(i));
    }

    for i in 0..5 {
        let event = next(&mut rx).await;
        assert_eq!(event.event, "tick");
        assert_eq!(event.payload, json!(i));
        assert_eq!(event.channel, format!("restaurant:{restaurant}"));
    }
}

#[tokio::test]
async fn double_unsubscribe_stops_handlers() {
    let (hub, _) = hub_with_feed();
    let staff = StaffId::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handle = hub.subscribe_staff(
        staff,
        Handlers::new().on_event(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    hub.broadcast(&Channel::Staff(staff), "order_assigned", json!({}));
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    handle.unsubscribe();
    handle.unsubscribe();
    assert!(!handle.is_active());

    hub.broadcast(&Channel::Staff(staff), "order_assigned", json!({}));
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resubscribe_tears_down_previous_handlers() {
    let (hub, _) = hub_with_feed();
    let session = SessionId::new();
    let (first_handlers, mut first_rx) = collecting_events();
    let (second_handlers, mut second_rx) = collecting_events();

    let first = hub.subscribe_session(session, first_handlers);
    let _second = hub.subscribe_session(session, second_handlers);
    assert_eq!(hub.subscription_count(), 1);

    hub.broadcast(&Channel::Session(session), "order_status_changed", json!({}));
    assert_eq!(next(&mut second_rx).await.event, "order_status_changed");
    settle().await;
    assert!(first_rx.try_recv().is_err());

    // Stale handle is harmless.
    first.unsubscribe();
    assert!(hub.is_subscribed(&Channel::Session(session)));
}

#[tokio::test]
async fn change_subscriptions_apply_filter() {
    let (hub, feed) = hub_with_feed();
    let restaurant = RestaurantId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = hub.subscribe_restaurant(
        restaurant,
        Handlers::new().on_change(move |change| {
            let _ = tx.send(change.clone());
        }),
    );

    let other = RowChange::new(
        Table::Orders,
        ChangeOp::Insert,
        &json!({"id": "x", "restaurant_id": RestaurantId::new().to_string()}),
    )
    .unwrap();
    let ours = RowChange::new(
        Table::OrderQueue,
        ChangeOp::Insert,
        &json!({"order_id": "y", "restaurant_id": restaurant.to_string(), "position": 1}),
    )
    .unwrap();
    feed.publish(other);
    feed.publish(ours.clone());

    let received = next(&mut rx).await;
    assert_eq!(received, ours);
    settle().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn custom_filter_subscription() {
    let (hub, feed) = hub_with_feed();
    let session = SessionId::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = hub.subscribe_filtered(
        Channel::Session(session),
        ChangeFilter::column_eq("id", session).on(Table::CustomerSessions),
        Handlers::new().on_change(move |change| {
            let _ = tx.send(change.table);
        }),
    );

    feed.publish(
        RowChange::new(
            Table::CustomerSessions,
            ChangeOp::Update,
            &json!({"id": session.to_string(), "status": "completed"}),
        )
        .unwrap(),
    );
    assert_eq!(next(&mut rx).await, Table::CustomerSessions);
}

#[tokio::test]
async fn order_events_reach_restaurant_session_and_staff() {
    let (hub, _) = hub_with_feed();
    let restaurant = RestaurantId::new();
    let session = SessionId::new();
    let staff = StaffId::new();

    let (r_handlers, mut r_rx) = collecting_events();
    let (s_handlers, mut s_rx) = collecting_events();
    let (st_handlers, mut st_rx) = collecting_events();
    let _r = hub.subscribe_restaurant(restaurant, r_handlers);
    let _s = hub.subscribe_session(session, s_handlers);
    let _st = hub.subscribe_staff(staff, st_handlers);

    let mut order = order_ref(restaurant, Some(session));
    order.assigned_staff_id = Some(staff);
    order.status = OrderStatus::Assigned;
    let event = OrderEvent::OrderAssigned(OrderAssignedData {
        order,
        staff_id: staff,
        reassignment: false,
        assigned_at: Utc::now(),
    });

    assert_eq!(hub.publish_event(&event), 3);
    for rx in [&mut r_rx, &mut s_rx, &mut st_rx] {
        let received = next(rx).await;
        assert_eq!(received.event, "order_assigned");
        assert_eq!(received.payload["type"], "order_assigned");
    }
}

#[tokio::test]
async fn rejection_reaches_rejecting_staff() {
    let (hub, _) = hub_with_feed();
    let restaurant = RestaurantId::new();
    let rejecting = StaffId::new();
    let (handlers, mut rx) = collecting_events();
    let _handle = hub.subscribe_staff(rejecting, handlers);

    let event = OrderEvent::OrderRejected(OrderRejectedData {
        order: order_ref(restaurant, None),
        staff_id: rejecting,
        reason: "busy".to_string(),
        rejected_at: Utc::now(),
    });
    hub.publish_event(&event);

    let received = next(&mut rx).await;
    assert_eq!(received.event, "order_rejected");
    assert_eq!(received.payload["data"]["reason"], "busy");
}

#[tokio::test]
async fn close_tears_down_every_channel() {
    let (hub, _) = hub_with_feed();
    let calls = Arc::new(AtomicUsize::new(0));
    let restaurant = RestaurantId::new();
    let mut handles = Vec::new();
    for _ in 0..3 {
        let counter = calls.clone();
        handles.push(hub.subscribe_staff(
            StaffId::new(),
            Handlers::new().on_event(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        ));
    }
    let _owner = hub.subscribe_restaurant(restaurant, Handlers::new());
    assert_eq!(hub.subscription_count(), 4);

    hub.close();
    assert_eq!(hub.subscription_count(), 0);
    assert!(handles.iter().all(|h| !h.is_active()));

    let event = OrderEvent::table_released(restaurant, TableId::new(), SessionId::new(), Actor::Owner);
    assert_eq!(hub.publish_event(&event), 0);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
