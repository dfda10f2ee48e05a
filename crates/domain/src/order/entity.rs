//! Order and order item records.

use chrono::{DateTime, Utc};
use common::{CustomerId, MenuItemId, OrderId, RestaurantId, SessionId, StaffId, TableId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    CartItem, Money, OrderError, OrderStatus, OrderType, PaymentMethod, PaymentStatus,
};

/// The central order record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub restaurant_id: RestaurantId,
    pub table_id: TableId,
    pub session_id: Option<SessionId>,
    pub customer_id: Option<CustomerId>,

    /// Human-readable order number (`ORD-<millis>-<token>`).
    pub order_number: String,

    pub status: OrderStatus,
    pub order_type: OrderType,

    pub subtotal: Money,
    pub platform_fee: Money,
    pub tip: Money,
    pub discount: Money,
    pub total: Money,

    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,

    pub assigned_staff_id: Option<StaffId>,

    pub special_instructions: Option<String>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns true if the order is currently assigned to `staff_id`.
    pub fn is_assigned_to(&self, staff_id: StaffId) -> bool {
        self.assigned_staff_id == Some(staff_id)
    }

    /// Checks the record-level invariants: staff assignment matches the
    /// status, totals add up, and lifecycle timestamps never go backwards.
    pub fn check_invariants(&self) -> Result<(), OrderError> {
        let has_staff = self.assigned_staff_id.is_some();
        let assignment_ok = match self.status {
            OrderStatus::Pending => !has_staff,
            OrderStatus::Cancelled => true,
            status => has_staff || !status.requires_staff(),
        };
        if !assignment_ok {
            return Err(OrderError::InconsistentAssignment {
                status: self.status,
                assigned: has_staff,
            });
        }

        let expected = self.subtotal + self.platform_fee + self.tip - self.discount;
        if !self.total.approx_eq(expected, 1e-6) {
            return Err(OrderError::InconsistentTotals {
                total: self.total,
                expected,
            });
        }

        let mut last = self.created_at;
        for stamp in [
            self.assigned_at,
            self.started_at,
            self.ready_at,
            self.completed_at,
        ]
        .into_iter()
        .flatten()
        {
            if stamp < last {
                return Err(OrderError::TimestampsOutOfOrder);
            }
            last = stamp;
        }

        Ok(())
    }
}

/// An immutable order line, created once with its order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: OrderId,
    pub item_id: MenuItemId,

    /// Name snapshot taken when the order was placed.
    pub name: String,

    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub instructions: Option<String>,
}

impl OrderItem {
    /// Snapshots a cart line into an order item.
    pub fn from_cart(order_id: OrderId, item: &CartItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            item_id: item.item_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.price,
            total_price: item.line_total(),
            instructions: item.instructions.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A freshly created, unassigned order.
    pub fn pending_order() -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(),
            restaurant_id: RestaurantId::new(),
            table_id: TableId::new(),
            session_id: Some(SessionId::new()),
            customer_id: None,
            order_number: "ORD-1700000000000-ABC123".to_string(),
            status: OrderStatus::Pending,
            order_type: OrderType::DineIn,
            subtotal: Money::new(200.0),
            platform_fee: Money::new(3.0),
            tip: Money::zero(),
            discount: Money::zero(),
            total: Money::new(203.0),
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
}
