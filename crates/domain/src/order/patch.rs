//! Conditional order mutations.
//!
//! Orders are only ever changed through a compare-and-set: an [`OrderGuard`]
//! describing the state the caller observed, and an [`OrderPatch`] that is
//! applied only if the stored order still matches the guard.

use chrono::{DateTime, Utc};
use common::StaffId;
use serde::{Deserialize, Serialize};

use super::{Order, OrderStatus};

/// Expected staff assignment for a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaffGuard {
    /// Assignment is not checked.
    Any,
    /// The order must have no assigned staff.
    Unassigned,
    /// The order must be assigned to this staff member.
    AssignedTo(StaffId),
}

impl StaffGuard {
    /// Builds the guard matching an observed assignment exactly.
    pub fn exactly(assigned: Option<StaffId>) -> Self {
        match assigned {
            Some(staff_id) => StaffGuard::AssignedTo(staff_id),
            None => StaffGuard::Unassigned,
        }
    }

    fn matches(&self, assigned: Option<StaffId>) -> bool {
        match self {
            StaffGuard::Any => true,
            StaffGuard::Unassigned => assigned.is_none(),
            StaffGuard::AssignedTo(staff_id) => assigned == Some(*staff_id),
        }
    }
}

/// The condition a stored order must satisfy for a patch to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderGuard {
    /// Allowed current statuses.
    pub statuses: Vec<OrderStatus>,
    /// Expected staff assignment.
    pub staff: StaffGuard,
}

impl OrderGuard {
    /// Requires the order to be in `status`.
    pub fn status(status: OrderStatus) -> Self {
        Self {
            statuses: vec![status],
            staff: StaffGuard::Any,
        }
    }

    /// Additionally requires the given staff assignment.
    pub fn with_staff(mut self, staff: StaffGuard) -> Self {
        self.staff = staff;
        self
    }

    /// Requires the order to be `assigned` to `staff_id`.
    pub fn assigned_to(staff_id: StaffId) -> Self {
        Self::status(OrderStatus::Assigned).with_staff(StaffGuard::AssignedTo(staff_id))
    }

    /// Requires the order to be `pending` with nobody assigned.
    pub fn unassigned_pending() -> Self {
        Self::status(OrderStatus::Pending).with_staff(StaffGuard::Unassigned)
    }

    /// Requires the order to still look exactly as observed.
    pub fn observed(order: &Order) -> Self {
        Self::status(order.status).with_staff(StaffGuard::exactly(order.assigned_staff_id))
    }

    /// Returns true if the order satisfies this guard.
    pub fn matches(&self, order: &Order) -> bool {
        self.statuses.contains(&order.status) && self.staff.matches(order.assigned_staff_id)
    }
}

/// A set of changes applied to an order by a conditional update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    /// New status, if the patch changes it.
    pub status: Option<OrderStatus>,
    /// New assignment: `Some(None)` clears it.
    pub assigned_staff: Option<Option<StaffId>>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    /// When the change happened; used for lifecycle stamps.
    pub at: DateTime<Utc>,
}

impl OrderPatch {
    /// Moves the order to `status`.
    pub fn transition(status: OrderStatus, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            assigned_staff: None,
            rejection_reason: None,
            cancellation_reason: None,
            at,
        }
    }

    /// Assigns the order to `staff_id`.
    pub fn assign(staff_id: StaffId, at: DateTime<Utc>) -> Self {
        Self {
            assigned_staff: Some(Some(staff_id)),
            ..Self::transition(OrderStatus::Assigned, at)
        }
    }

    /// Returns the order to `pending` and clears the assignment.
    pub fn reject(reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            assigned_staff: Some(None),
            rejection_reason: Some(reason.into()),
            ..Self::transition(OrderStatus::Pending, at)
        }
    }

    /// Records why the order was cancelled.
    pub fn with_cancellation_reason(mut self, reason: Option<String>) -> Self {
        self.cancellation_reason = reason;
        self
    }

    /// Returns the lifecycle timestamp column stamped by a status, if any.
    pub fn stamp_column(status: OrderStatus) -> Option<&'static str> {
        match status {
            OrderStatus::Assigned => Some("assigned_at"),
            OrderStatus::Accepted => Some("started_at"),
            OrderStatus::Ready => Some("ready_at"),
            OrderStatus::Delivered | OrderStatus::Completed => Some("completed_at"),
            OrderStatus::Cancelled => Some("cancelled_at"),
            OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::Served => None,
        }
    }

    /// Applies the patch. Lifecycle timestamps are only set if still empty.
    pub fn apply_to(&self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
            let stamp = match status {
                OrderStatus::Assigned => Some(&mut order.assigned_at),
                OrderStatus::Accepted => Some(&mut order.started_at),
                OrderStatus::Ready => Some(&mut order.ready_at),
                OrderStatus::Delivered | OrderStatus::Completed => Some(&mut order.completed_at),
                OrderStatus::Cancelled => Some(&mut order.cancelled_at),
                OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::Served => None,
            };
            if let Some(stamp) = stamp {
                stamp.get_or_insert(self.at);
            }
        }
        if let Some(assigned) = self.assigned_staff {
            order.assigned_staff_id = assigned;
        }
        if let Some(reason) = &self.rejection_reason {
            order.rejection_reason = Some(reason.clone());
        }
        if let Some(reason) = &self.cancellation_reason {
            order.cancellation_reason = Some(reason.clone());
        }
        order.updated_at = self.at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::entity::fixtures::pending_order;

    #[test]
    fn guard_matches_status_and_staff() {
        let staff = StaffId::new();
        let mut order = pending_order();

        assert!(OrderGuard::unassigned_pending().matches(&order));
        assert!(!OrderGuard::assigned_to(staff).matches(&order));

        OrderPatch::assign(staff, Utc::now()).apply_to(&mut order);
        assert!(OrderGuard::assigned_to(staff).matches(&order));
        assert!(!OrderGuard::assigned_to(StaffId::new()).matches(&order));
        assert!(!OrderGuard::unassigned_pending().matches(&order));
    }

    #[test]
    fn observed_guard_detects_reassignment() {
        let mut order = pending_order();
        OrderPatch::assign(StaffId::new(), Utc::now()).apply_to(&mut order);
        let guard = OrderGuard::observed(&order);

        OrderPatch::assign(StaffId::new(), Utc::now()).apply_to(&mut order);
        assert!(!guard.matches(&order));
    }

    #[test]
    fn assign_stamps_assigned_at_once() {
        let mut order = pending_order();
        let first = Utc::now();
        OrderPatch::assign(StaffId::new(), first).apply_to(&mut order);
        assert_eq!(order.assigned_at, Some(first));

        OrderPatch::reject("busy", first + chrono::Duration::seconds(5)).apply_to(&mut order);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.assigned_staff_id, None);
        assert_eq!(order.rejection_reason.as_deref(), Some("busy"));

        let second = first + chrono::Duration::seconds(10);
        OrderPatch::assign(StaffId::new(), second).apply_to(&mut order);
        assert_eq!(order.assigned_at, Some(first));
        assert_eq!(order.updated_at, second);
    }

    #[test]
    fn status_stamps() {
        let mut order = pending_order();
        let now = Utc::now();
        OrderPatch::assign(StaffId::new(), now).apply_to(&mut order);
        OrderPatch::transition(OrderStatus::Accepted, now).apply_to(&mut order);
        assert_eq!(order.started_at, Some(now));
        OrderPatch::transition(OrderStatus::Preparing, now).apply_to(&mut order);
        OrderPatch::transition(OrderStatus::Ready, now).apply_to(&mut order);
        assert_eq!(order.ready_at, Some(now));
        OrderPatch::transition(OrderStatus::Delivered, now).apply_to(&mut order);
        assert_eq!(order.completed_at, Some(now));
        assert!(order.check_invariants().is_ok());
    }

    #[test]
    fn cancellation_reason_is_recorded() {
        let mut order = pending_order();
        OrderPatch::transition(OrderStatus::Cancelled, Utc::now())
            .with_cancellation_reason(Some("customer left".to_string()))
            .apply_to(&mut order);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.cancelled_at.is_some());
        assert_eq!(order.cancellation_reason.as_deref(), Some("customer left"));
    }

    #[test]
    fn stamp_columns() {
        assert_eq!(OrderPatch::stamp_column(OrderStatus::Accepted), Some("started_at"));
        assert_eq!(OrderPatch::stamp_column(OrderStatus::Served), None);
    }
}
