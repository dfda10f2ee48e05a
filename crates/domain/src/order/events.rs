//! Order transition events.
//!
//! Every state change the workflow engine makes is described by one
//! [`OrderEvent`]. Events drive notification fan-out and realtime
//! propagation; they are not the source of truth for the order itself.

use chrono::{DateTime, Utc};
use common::{OrderId, RestaurantId, SessionId, StaffId, TableId};
use serde::{Deserialize, Serialize};

use super::{Actor, Money, Order, OrderSource, OrderStatus};

/// Trait for domain events.
pub trait DomainEvent: Serialize + Send + Sync + Clone {
    /// Returns the event type name, used as the realtime event name.
    fn event_type(&self) -> &'static str;
}

/// The order fields every event carries so observers can route it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRef {
    pub order_id: OrderId,
    pub order_number: String,
    pub restaurant_id: RestaurantId,
    pub table_id: TableId,
    pub session_id: Option<SessionId>,
    pub assigned_staff_id: Option<StaffId>,
    pub status: OrderStatus,
}

impl From<&Order> for OrderRef {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            restaurant_id: order.restaurant_id,
            table_id: order.table_id,
            session_id: order.session_id,
            assigned_staff_id: order.assigned_staff_id,
            status: order.status,
        }
    }
}

/// Events emitted by order workflow transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A new order was persisted.
    OrderCreated(OrderCreatedData),

    /// A staff member was assigned (automatically, manually, or after a rejection).
    OrderAssigned(OrderAssignedData),

    /// No staff member could be assigned; the order stays pending.
    NoStaffAvailable(NoStaffAvailableData),

    /// The assigned staff member accepted the order.
    OrderAccepted(OrderAcceptedData),

    /// The assigned staff member rejected the order.
    OrderRejected(OrderRejectedData),

    /// The order moved along the preparation lifecycle.
    OrderStatusChanged(OrderStatusChangedData),

    /// The order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// The session ended and the table was released.
    TableReleased(TableReleasedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "order_created",
            OrderEvent::OrderAssigned(_) => "order_assigned",
            OrderEvent::NoStaffAvailable(_) => "no_staff_available",
            OrderEvent::OrderAccepted(_) => "order_accepted",
            OrderEvent::OrderRejected(_) => "order_rejected",
            OrderEvent::OrderStatusChanged(_) => "order_status_changed",
            OrderEvent::OrderCancelled(_) => "order_cancelled",
            OrderEvent::TableReleased(_) => "table_released",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order: OrderRef,
    pub source: OrderSource,
    pub total: Money,
    pub item_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAssignedData {
    pub order: OrderRef,
    pub staff_id: StaffId,
    /// True when the assignment follows a rejection.
    pub reassignment: bool,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoStaffAvailableData {
    pub order: OrderRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAcceptedData {
    pub order: OrderRef,
    pub staff_id: StaffId,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRejectedData {
    pub order: OrderRef,
    pub staff_id: StaffId,
    pub reason: String,
    pub rejected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    pub order: OrderRef,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub updated_by: Actor,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order: OrderRef,
    pub from: OrderStatus,
    pub reason: Option<String>,
    pub cancelled_by: Actor,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReleasedData {
    pub restaurant_id: RestaurantId,
    pub table_id: TableId,
    pub session_id: SessionId,
    pub released_by: Actor,
    pub released_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn order_created(order: &Order, source: OrderSource, item_count: usize) -> Self {
        OrderEvent::OrderCreated(OrderCreatedData {
            order: order.into(),
            source,
            total: order.total,
            item_count,
            created_at: order.created_at,
        })
    }

    pub fn order_assigned(order: &Order, staff_id: StaffId, reassignment: bool) -> Self {
        OrderEvent::OrderAssigned(OrderAssignedData {
            order: order.into(),
            staff_id,
            reassignment,
            assigned_at: order.updated_at,
        })
    }

    pub fn no_staff_available(order: &Order) -> Self {
        OrderEvent::NoStaffAvailable(NoStaffAvailableData {
            order: order.into(),
        })
    }

    pub fn order_accepted(order: &Order, staff_id: StaffId) -> Self {
        OrderEvent::OrderAccepted(OrderAcceptedData {
            order: order.into(),
            staff_id,
            accepted_at: order.updated_at,
        })
    }

    pub fn order_rejected(order: &Order, staff_id: StaffId, reason: impl Into<String>) -> Self {
        OrderEvent::OrderRejected(OrderRejectedData {
            order: order.into(),
            staff_id,
            reason: reason.into(),
            rejected_at: order.updated_at,
        })
    }

    pub fn status_changed(order: &Order, from: OrderStatus, updated_by: Actor) -> Self {
        OrderEvent::OrderStatusChanged(OrderStatusChangedData {
            order: order.into(),
            from,
            to: order.status,
            updated_by,
            changed_at: order.updated_at,
        })
    }

    pub fn order_cancelled(order: &Order, from: OrderStatus, cancelled_by: Actor) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            order: order.into(),
            from,
            reason: order.cancellation_reason.clone(),
            cancelled_by,
            cancelled_at: order.cancelled_at.unwrap_or(order.updated_at),
        })
    }

    pub fn table_released(
        restaurant_id: RestaurantId,
        table_id: TableId,
        session_id: SessionId,
        released_by: Actor,
    ) -> Self {
        OrderEvent::TableReleased(TableReleasedData {
            restaurant_id,
            table_id,
            session_id,
            released_by,
            released_at: Utc::now(),
        })
    }

    /// Returns the order reference, if the event concerns a single order.
    pub fn order(&self) -> Option<&OrderRef> {
        match self {
            OrderEvent::OrderCreated(d) => Some(&d.order),
            OrderEvent::OrderAssigned(d) => Some(&d.order),
            OrderEvent::NoStaffAvailable(d) => Some(&d.order),
            OrderEvent::OrderAccepted(d) => Some(&d.order),
            OrderEvent::OrderRejected(d) => Some(&d.order),
            OrderEvent::OrderStatusChanged(d) => Some(&d.order),
            OrderEvent::OrderCancelled(d) => Some(&d.order),
            OrderEvent::TableReleased(_) => None,
        }
    }

    /// Returns the restaurant the event belongs to.
    pub fn restaurant_id(&self) -> RestaurantId {
        match self {
            OrderEvent::TableReleased(d) => d.restaurant_id,
            other => other
                .order()
                .map(|o| o.restaurant_id)
                .unwrap_or_default(),
        }
    }

    /// Returns the customer session the event concerns, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            OrderEvent::TableReleased(d) => Some(d.session_id),
            other => other.order().and_then(|o| o.session_id),
        }
    }

    /// Returns every staff member involved in the event.
    pub fn staff_ids(&self) -> Vec<StaffId> {
        let mut ids = Vec::new();
        match self {
            OrderEvent::OrderAssigned(d) => ids.push(d.staff_id),
            OrderEvent::OrderAccepted(d) => ids.push(d.staff_id),
            OrderEvent::OrderRejected(d) => ids.push(d.staff_id),
            _ => {}
        }
        if let Some(staff_id) = self.order().and_then(|o| o.assigned_staff_id) {
            if !ids.contains(&staff_id) {
                ids.push(staff_id);
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::entity::fixtures::pending_order;
    use crate::order::OrderPatch;

    #[test]
    fn event_types_are_snake_case() {
        let order = pending_order();
        assert_eq!(
            OrderEvent::order_created(&order, OrderSource::Customer, 1).event_type(),
            "order_created"
        );
        assert_eq!(
            OrderEvent::no_staff_available(&order).event_type(),
            "no_staff_available"
        );
    }

    #[test]
    fn serialized_tag_matches_event_type() {
        let order = pending_order();
        let event = OrderEvent::order_created(&order, OrderSource::Customer, 2);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert_eq!(json["data"]["item_count"], 2);
    }

    #[test]
    fn rejection_routes_to_rejecting_staff() {
        let mut order = pending_order();
        let staff = StaffId::new();
        OrderPatch::assign(staff, Utc::now()).apply_to(&mut order);
        OrderPatch::reject("too busy", Utc::now()).apply_to(&mut order);

        let event = OrderEvent::order_rejected(&order, staff, "too busy");
        assert_eq!(event.staff_ids(), vec![staff]);
        assert_eq!(event.restaurant_id(), order.restaurant_id);
        assert_eq!(event.session_id(), order.session_id);
    }

    #[test]
    fn assigned_staff_is_included_once() {
        let mut order = pending_order();
        let staff = StaffId::new();
        OrderPatch::assign(staff, Utc::now()).apply_to(&mut order);
        let event = OrderEvent::order_assigned(&order, staff, false);
        assert_eq!(event.staff_ids(), vec![staff]);
    }

    #[test]
    fn table_released_has_no_order() {
        let event = OrderEvent::table_released(
            RestaurantId::new(),
            TableId::new(),
            SessionId::new(),
            Actor::Owner,
        );
        assert!(event.order().is_none());
        assert!(event.session_id().is_some());
        assert!(event.staff_ids().is_empty());
    }
}
