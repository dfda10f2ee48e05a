//! Order status state machine.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Assigned ──► Accepted ──► Preparing ──► Ready ──┬──► Served ────┬──► Completed
///    ▲           │                                            └──► Delivered ─┘
///    └───────────┘ (rejection)
///
/// any non-terminal state ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for a staff member to be assigned.
    #[default]
    Pending,

    /// A staff member has been assigned but has not yet accepted.
    Assigned,

    /// The assigned staff member accepted the order.
    Accepted,

    /// The kitchen is preparing the order.
    Preparing,

    /// The order is ready to be taken to the table.
    Ready,

    /// The order was served at the table.
    Served,

    /// The order was delivered.
    Delivered,

    /// The order is closed (terminal state).
    Completed,

    /// The order was cancelled (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Pending,
        OrderStatus::Assigned,
        OrderStatus::Accepted,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Served,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Returns true if `next` is directly reachable from this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        match (*self, next) {
            (current, Cancelled) => !current.is_terminal(),
            (Pending, Assigned)
            | (Assigned, Pending)
            | (Assigned, Accepted)
            | (Accepted, Preparing)
            | (Preparing, Ready)
            | (Ready, Served)
            | (Ready, Delivered)
            | (Served, Completed)
            | (Delivered, Completed) => true,
            _ => false,
        }
    }

    /// Returns an error unless `next` is directly reachable from this status.
    pub fn ensure_transition(&self, next: OrderStatus) -> Result<(), OrderError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(OrderError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }

    /// Returns true if an order in this status must have an assigned staff member.
    pub fn requires_staff(&self) -> bool {
        !matches!(self, OrderStatus::Pending | OrderStatus::Cancelled)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored and transmitted.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Assigned => "assigned",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Served => "served",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}
