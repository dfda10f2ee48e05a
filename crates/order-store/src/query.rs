use common::{RestaurantId, SessionId, StaffId};
use domain::{Order, OrderStatus};
use serde::{Deserialize, Serialize};

/// Builder for constructing order queries.
///
/// Every filter is optional; an empty query matches all orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderQuery {
    /// Filter by restaurant.
    pub restaurant_id: Option<RestaurantId>,

    /// Filter by status (any of these).
    #[serde(default)]
    pub statuses: Vec<OrderStatus>,

    /// Filter by assigned staff member.
    pub assigned_staff_id: Option<StaffId>,

    /// Filter by customer session.
    pub session_id: Option<SessionId>,

    /// Maximum number of orders to return.
    pub limit: Option<usize>,

    /// Number of orders to skip.
    pub offset: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for a restaurant's orders.
    pub fn for_restaurant(restaurant_id: RestaurantId) -> Self {
        Self {
            restaurant_id: Some(restaurant_id),
            ..Default::default()
        }
    }

    /// Creates a query for a session's orders.
    pub fn for_session(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            ..Default::default()
        }
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.statuses = vec![status];
        self
    }

    /// Filters by multiple statuses (any of these).
    pub fn statuses(mut self, statuses: Vec<OrderStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Filters by assigned staff member.
    pub fn assigned_to(mut self, staff_id: StaffId) -> Self {
        self.assigned_staff_id = Some(staff_id);
        self
    }

    /// Filters by session.
    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the order matches every filter (ignores paging).
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(restaurant_id) = self.restaurant_id {
            if order.restaurant_id != restaurant_id {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&order.status) {
            return false;
        }
        if let Some(staff_id) = self.assigned_staff_id {
            if order.assigned_staff_id != Some(staff_id) {
                return false;
            }
        }
        if let Some(session_id) = self.session_id {
            if order.session_id != Some(session_id) {
                return false;
            }
        }
        true
    }
}
