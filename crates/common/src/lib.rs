//! Identifier types shared by every crate in the workspace.

mod types;

pub use types::{
    CustomerId, MenuItemId, NotificationId, OrderId, RestaurantId, SessionId, StaffId, TableId,
};
