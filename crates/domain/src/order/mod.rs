//! Order record, status state machine and related types.

mod commands;
mod entity;
mod events;
mod patch;
mod state;
mod value_objects;

pub use commands::{CreateOrderRequest, UpdateOrderStatus};
pub use entity::{Order, OrderItem};
pub use events::{
    DomainEvent, NoStaffAvailableData, OrderAcceptedData, OrderAssignedData, OrderCancelledData,
    OrderCreatedData, OrderEvent, OrderRef, OrderRejectedData, OrderStatusChangedData,
    TableReleasedData,
};
pub use patch::{OrderGuard, OrderPatch, StaffGuard};
pub use state::OrderStatus;
pub use value_objects::{
    Actor, AppliedOffer, CartItem, CustomerInfo, Money, OrderSource, OrderType, PaymentMethod,
    PaymentStatus,
};

use thiserror::Error;

/// Errors raised by order-level rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// The target status is not reachable from the current one.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A status string did not name a known status.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// Staff assignment does not match the status.
    #[error("Order in status {status} has inconsistent staff assignment (assigned: {assigned})")]
    InconsistentAssignment { status: OrderStatus, assigned: bool },

    /// Stored total does not equal subtotal + fee + tip - discount.
    #[error("Order total {total} does not match computed total {expected}")]
    InconsistentTotals { total: Money, expected: Money },

    /// A lifecycle timestamp precedes an earlier one.
    #[error("Order lifecycle timestamps are out of order")]
    TimestampsOutOfOrder,
}
