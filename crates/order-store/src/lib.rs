//! Persistence gateway for the order workflow.
//!
//! The [`OrderStore`] trait covers the `orders`, `order_items`,
//! `customer_sessions`, `order_queue` and `offer_usages` tables. Orders are
//! only mutated through [`OrderStore::update_order_if`], a compare-and-set
//! on status and staff assignment. [`OrderGateway`] wraps any store with a
//! [`RetryPolicy`] and publishes a [`RowChange`] after every write.

pub mod change;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod retry;
pub mod store;

pub use change::{ChangeFeed, ChangeFilter, ChangeOp, RowChange, Table};
pub use error::{Result, StoreError};
pub use gateway::OrderGateway;
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use query::OrderQuery;
pub use retry::RetryPolicy;
pub use store::{
    ConditionalUpdate, CreatedOrder, NewOrder, OfferUsage, OrderStore, OrderStoreExt, QueueRequest,
};
