//! Notification records and the closed set of notification kinds.

use chrono::{DateTime, Utc};
use common::{NotificationId, OrderId, RestaurantId, SessionId, StaffId, TableId};
use domain::{Money, OrderStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::NotificationError;

/// Who receives a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    /// The restaurant owner's dashboard.
    Owner(RestaurantId),
    Staff(StaffId),
    /// The customer at the table, addressed through their session.
    Customer(SessionId),
}

impl Recipient {
    pub fn recipient_type(&self) -> &'static str {
        match self {
            Recipient::Owner(_) => "owner",
            Recipient::Staff(_) => "staff",
            Recipient::Customer(_) => "customer",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Recipient::Owner(id) => id.as_uuid(),
            Recipient::Staff(id) => id.as_uuid(),
            Recipient::Customer(id) => id.as_uuid(),
        }
    }

    /// Rebuilds a recipient from its stored type name and id.
    pub fn from_parts(recipient_type: &str, id: Uuid) -> Result<Self, NotificationError> {
        match recipient_type {
            "owner" => Ok(Recipient::Owner(RestaurantId::from_uuid(id))),
            "staff" => Ok(Recipient::Staff(StaffId::from_uuid(id))),
            "customer" => Ok(Recipient::Customer(SessionId::from_uuid(id))),
            other => Err(NotificationError::UnknownRecipientType(other.to_string())),
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.recipient_type(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every notification the platform sends, with the payload each one carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum NotificationKind {
    NewOrder {
        order_number: String,
        table_id: TableId,
        total: Money,
        item_count: usize,
    },
    /// Tells owner and customer who is handling the order.
    StaffAssigned {
        order_number: String,
        staff_id: StaffId,
        reassignment: bool,
    },
    /// Tells the staff member an order is waiting for them.
    OrderAssigned {
        order_number: String,
        table_id: TableId,
        reassignment: bool,
    },
    NoStaffAvailable {
        order_number: String,
        table_id: TableId,
    },
    OrderAccepted {
        order_number: String,
        staff_id: StaffId,
    },
    OrderRejected {
        order_number: String,
        staff_id: StaffId,
        reason: String,
    },
    OrderStatusUpdate {
        order_number: String,
        status: OrderStatus,
        previous: Option<OrderStatus>,
    },
    OrderCancelled {
        order_number: String,
        reason: Option<String>,
    },
    TableReleased {
        table_id: TableId,
        session_id: SessionId,
    },
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::NewOrder { .. } => "new_order",
            NotificationKind::StaffAssigned { .. } => "staff_assigned",
            NotificationKind::OrderAssigned { .. } => "order_assigned",
            NotificationKind::NoStaffAvailable { .. } => "no_staff_available",
            NotificationKind::OrderAccepted { .. } => "order_accepted",
            NotificationKind::OrderRejected { .. } => "order_rejected",
            NotificationKind::OrderStatusUpdate { .. } => "order_status_update",
            NotificationKind::OrderCancelled { .. } => "order_cancelled",
            NotificationKind::TableReleased { .. } => "table_released",
        }
    }

    pub fn priority(&self) -> Priority {
        match self {
            NotificationKind::NoStaffAvailable { .. } => Priority::Urgent,
            NotificationKind::NewOrder { .. }
            | NotificationKind::OrderAssigned { .. }
            | NotificationKind::OrderRejected { .. }
            | NotificationKind::OrderCancelled { .. } => Priority::High,
            NotificationKind::StaffAssigned { .. }
            | NotificationKind::OrderAccepted { .. }
            | NotificationKind::OrderStatusUpdate { .. } => Priority::Normal,
            NotificationKind::TableReleased { .. } => Priority::Low,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            NotificationKind::NewOrder { .. } => "New order",
            NotificationKind::StaffAssigned { .. } => "Staff assigned",
            NotificationKind::OrderAssigned { .. } => "Order assigned to you",
            NotificationKind::NoStaffAvailable { .. } => "No staff available",
            NotificationKind::OrderAccepted { .. } => "Order accepted",
            NotificationKind::OrderRejected { .. } => "Order rejected",
            NotificationKind::OrderStatusUpdate { .. } => "Order update",
            NotificationKind::OrderCancelled { .. } => "Order cancelled",
            NotificationKind::TableReleased { .. } => "Table released",
        }
    }

    pub fn message(&self) -> String {
        match self {
            NotificationKind::NewOrder {
                order_number,
                total,
                item_count,
                ..
            } => format!("Order {order_number} placed: {item_count} item(s), total {total}"),
            NotificationKind::StaffAssigned {
                order_number,
                reassignment: true,
                ..
            } => format!("Order {order_number} was reassigned to another staff member"),
            NotificationKind::StaffAssigned { order_number, .. } => {
                format!("A staff member is now handling order {order_number}")
            }
            NotificationKind::OrderAssigned {
                order_number,
                reassignment,
                ..
            } => {
                if *reassignment {
                    format!("Order {order_number} was reassigned to you")
                } else {
                    format!("Order {order_number} is waiting for you to accept it")
                }
            }
            NotificationKind::NoStaffAvailable { order_number, .. } => {
                format!("No staff member is available for order {order_number}; assign one manually")
            }
            NotificationKind::OrderAccepted { order_number, .. } => {
                format!("Order {order_number} was accepted")
            }
            NotificationKind::OrderRejected {
                order_number,
                reason,
                ..
            } => format!("Order {order_number} was rejected: {reason}"),
            NotificationKind::OrderStatusUpdate {
                order_number,
                status,
                ..
            } => format!("Order {order_number} is now {status}"),
            NotificationKind::OrderCancelled {
                order_number,
                reason: Some(reason),
            } => format!("Order {order_number} was cancelled: {reason}"),
            NotificationKind::OrderCancelled { order_number, .. } => {
                format!("Order {order_number} was cancelled")
            }
            NotificationKind::TableReleased { .. } => "The table has been released".to_string(),
        }
    }
}

/// One persisted notification. Only `is_read` changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub recipient: Recipient,
    pub order_id: Option<OrderId>,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Builds an unread record; title, message and priority derive from `kind`.
    pub fn new(recipient: Recipient, order_id: Option<OrderId>, kind: NotificationKind) -> Self {
        Self {
            id: NotificationId::new(),
            recipient,
            order_id,
            title: kind.title().to_string(),
            message: kind.message(),
            priority: kind.priority(),
            kind,
            is_read: false,
            created_at: Utc::now(),
        }
    }
}
