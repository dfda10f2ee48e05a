//! Customer sessions and preparation queue entries.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, RestaurantId, SessionId, StaffId, TableId};
use serde::{Deserialize, Serialize};

use crate::order::CustomerInfo;

/// Estimated wait reported for a new queue entry.
pub const DEFAULT_ESTIMATED_WAIT_MINUTES: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

/// One dining occasion at one table. A session may own many orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSession {
    pub id: SessionId,
    pub restaurant_id: RestaurantId,
    pub table_id: TableId,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub created_by_staff: bool,
    /// Staff member who opened the session for a staff-assisted order.
    pub staff_id: Option<StaffId>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CustomerSession {
    /// Opens a session for a customer ordering from the table.
    pub fn open(restaurant_id: RestaurantId, table_id: TableId, customer: &CustomerInfo) -> Self {
        Self {
            id: SessionId::new(),
            restaurant_id,
            table_id,
            customer_name: customer.name.trim().to_string(),
            customer_phone: customer.phone.trim().to_string(),
            customer_email: customer.email.clone(),
            customer_id: customer.customer_id,
            created_by_staff: false,
            staff_id: None,
            status: SessionStatus::Active,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Opens a session on the customer's behalf by a staff member.
    pub fn open_by_staff(
        restaurant_id: RestaurantId,
        table_id: TableId,
        customer: &CustomerInfo,
        staff_id: StaffId,
    ) -> Self {
        Self {
            created_by_staff: true,
            staff_id: Some(staff_id),
            ..Self::open(restaurant_id, table_id, customer)
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePriority {
    Low,
    #[default]
    Normal,
    High,
}

impl QueuePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueuePriority::Low => "low",
            QueuePriority::Normal => "normal",
            QueuePriority::High => "high",
        }
    }
}

/// Advisory position of an order in the restaurant's preparation queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    /// Strictly increasing per restaurant, assigned at insertion.
    pub position: i64,
    pub priority: QueuePriority,
    pub estimated_wait_minutes: u32,
    pub created_at: DateTime<Utc>,
}
