//! Order commands.

use common::{OrderId, RestaurantId, SessionId, StaffId, TableId};
use serde::{Deserialize, Serialize};

use super::{Actor, AppliedOffer, CartItem, CustomerInfo, Money, OrderSource, OrderStatus, PaymentMethod};

/// Command to place a new order.
///
/// Restaurant and table are optional here so that missing references are
/// reported together with every other validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub source: OrderSource,
    pub restaurant_id: Option<RestaurantId>,
    pub table_id: Option<TableId>,
    pub cart: Vec<CartItem>,
    pub customer: CustomerInfo,

    /// Initiating staff member; required for staff-assisted orders.
    #[serde(default)]
    pub staff_id: Option<StaffId>,

    /// Existing session to attach the order to (re-order within a visit).
    #[serde(default)]
    pub session_id: Option<SessionId>,

    #[serde(default)]
    pub payment_method: PaymentMethod,

    #[serde(default)]
    pub tip: Money,

    #[serde(default)]
    pub offer: Option<AppliedOffer>,

    #[serde(default)]
    pub special_instructions: Option<String>,
}

impl CreateOrderRequest {
    /// Creates a customer-initiated order request.
    pub fn from_customer(
        restaurant_id: RestaurantId,
        table_id: TableId,
        cart: Vec<CartItem>,
        customer: CustomerInfo,
    ) -> Self {
        Self {
            source: OrderSource::Customer,
            restaurant_id: Some(restaurant_id),
            table_id: Some(table_id),
            cart,
            customer,
            staff_id: None,
            session_id: None,
            payment_method: PaymentMethod::default(),
            tip: Money::zero(),
            offer: None,
            special_instructions: None,
        }
    }

    /// Creates a staff-assisted order request placed by `staff_id`.
    pub fn from_staff(
        staff_id: StaffId,
        restaurant_id: RestaurantId,
        table_id: TableId,
        cart: Vec<CartItem>,
        customer: CustomerInfo,
    ) -> Self {
        Self {
            source: OrderSource::Staff,
            staff_id: Some(staff_id),
            ..Self::from_customer(restaurant_id, table_id, cart, customer)
        }
    }

    pub fn with_tip(mut self, tip: f64) -> Self {
        self.tip = Money::new(tip);
        self
    }

    pub fn with_offer(mut self, offer_id: impl Into<String>, discount: f64) -> Self {
        self.offer = Some(AppliedOffer {
            offer_id: offer_id.into(),
            discount: Money::new(discount),
        });
        self
    }

    pub fn with_payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = payment_method;
        self
    }

    pub fn in_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Returns the discount granted by the applied offer, or zero.
    pub fn discount(&self) -> Money {
        self.offer
            .as_ref()
            .map(|offer| offer.discount)
            .unwrap_or_default()
    }
}

/// Command to change an order's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    /// Staff to assign when moving a pending order to `assigned`.
    #[serde(default)]
    pub staff_id: Option<StaffId>,
    pub updated_by: Actor,
    /// Reason recorded when cancelling.
    #[serde(default)]
    pub reason: Option<String>,
}

impl UpdateOrderStatus {
    pub fn new(order_id: OrderId, status: OrderStatus, updated_by: Actor) -> Self {
        Self {
            order_id,
            status,
            staff_id: None,
            updated_by,
            reason: None,
        }
    }

    pub fn with_staff(mut self, staff_id: StaffId) -> Self {
        self.staff_id = Some(staff_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
