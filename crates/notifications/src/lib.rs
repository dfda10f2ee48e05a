//! Notification fan-out for order workflow transitions.
//!
//! - [`NotificationKind`] is the closed set of notifications, each with its own payload
//! - [`NotificationStore`] persists [`NotificationRecord`]s (in-memory or PostgreSQL)
//! - [`NotificationFanout`] turns one [`domain::OrderEvent`] into one record per
//!   interested recipient and never fails the caller

pub mod error;
pub mod fanout;
pub mod memory;
pub mod notification;
pub mod postgres;
pub mod store;

pub use error::{NotificationError, Result};
pub use fanout::{FanoutReport, NotificationFanout, notifications_for};
pub use memory::InMemoryNotificationStore;
pub use notification::{NotificationKind, NotificationRecord, Priority, Recipient};
pub use postgres::PostgresNotificationStore;
pub use store::NotificationStore;
