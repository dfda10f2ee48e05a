//! Domain layer for the restaurant order workflow.
//!
//! This crate provides the core domain types including:
//! - Order record, order items and the status state machine
//! - Conditional patches used for compare-and-set order updates
//! - Transition events consumed by notification and realtime fan-out
//! - Customer sessions and preparation queue entries
//! - Pure validation and totals calculation
//! - Order number generation

pub mod order;
pub mod order_number;
pub mod session;
pub mod validation;

pub use order::{
    Actor, AppliedOffer, CartItem, CreateOrderRequest, CustomerInfo, DomainEvent, Money, Order,
    OrderError, OrderEvent, OrderGuard, OrderItem, OrderPatch, OrderRef, OrderSource, OrderStatus,
    OrderType, PaymentMethod, PaymentStatus, StaffGuard, UpdateOrderStatus,
};
pub use order_number::{generate_order_number, is_valid_order_number};
pub use session::{
    CustomerSession, DEFAULT_ESTIMATED_WAIT_MINUTES, QueueEntry, QueuePriority, SessionStatus,
};
pub use validation::{
    DEFAULT_PLATFORM_FEE_RATE, Totals, ValidationErrors, ValidationIssue, calculate_totals,
    validate_cart, validate_order,
};
