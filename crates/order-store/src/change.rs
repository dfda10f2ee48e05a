//! Change feed of persisted row mutations.
//!
//! After every successful write the gateway publishes a [`RowChange`]
//! carrying the written row as JSON. Realtime change subscriptions filter
//! the feed with a [`ChangeFilter`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Default change feed capacity.
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 1024;

/// Tables covered by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Orders,
    OrderItems,
    CustomerSessions,
    OrderQueue,
    OfferUsages,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::OrderItems => "order_items",
            Table::CustomerSessions => "customer_sessions",
            Table::OrderQueue => "order_queue",
            Table::OfferUsages => "offer_usages",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
}

/// One persisted mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub table: Table,
    pub op: ChangeOp,
    /// The row after the write.
    pub row: Value,
    pub at: DateTime<Utc>,
}

impl RowChange {
    /// Serializes `row` into a change record.
    pub fn new<T: Serialize>(table: Table, op: ChangeOp, row: &T) -> serde_json::Result<Self> {
        Ok(Self {
            table,
            op,
            row: serde_json::to_value(row)?,
            at: Utc::now(),
        })
    }

    /// Adds a column to the row, e.g. to make child rows filterable by their parent's keys.
    pub fn with_column(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Value::Object(map) = &mut self.row {
            map.entry(column.to_string()).or_insert(value.into());
        }
        self
    }

    /// Returns a column of the row rendered as a string, if present and scalar.
    pub fn column(&self, column: &str) -> Option<String> {
        match self.row.get(column)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Predicate over row changes: `column = value`, optionally restricted to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFilter {
    pub table: Option<Table>,
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    /// Matches rows of any table where `column = value`.
    pub fn column_eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            table: None,
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// Restricts the filter to one table.
    pub fn on(mut self, table: Table) -> Self {
        self.table = Some(table);
        self
    }

    pub fn matches(&self, change: &RowChange) -> bool {
        if let Some(table) = self.table {
            if change.table != table {
                return false;
            }
        }
        change.column(&self.column).as_deref() == Some(self.value.as_str())
    }
}

/// Broadcast fan-out of row changes.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<RowChange>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes a change to every current subscriber.
    pub fn publish(&self, change: RowChange) {
        // No subscribers is not an error; the store remains the source of truth.
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RowChange> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGE_FEED_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_change() -> RowChange {
        RowChange {
            table: Table::Orders,
            op: ChangeOp::Update,
            row: json!({"id": "o-1", "restaurant_id": "r-1", "session_id": null, "position": 3}),
            at: Utc::now(),
        }
    }

    #[test]
    fn filter_matches_column_value() {
        let change = order_change();
        assert!(ChangeFilter::column_eq("restaurant_id", "r-1").matches(&change));
        assert!(!ChangeFilter::column_eq("restaurant_id", "r-2").matches(&change));
        assert!(!ChangeFilter::column_eq("session_id", "s-1").matches(&change));
        assert!(ChangeFilter::column_eq("position", 3).matches(&change));
    }

    #[test]
    fn filter_restricted_to_table() {
        let change = order_change();
        assert!(ChangeFilter::column_eq("restaurant_id", "r-1").on(Table::Orders).matches(&change));
        assert!(
            !ChangeFilter::column_eq("restaurant_id", "r-1")
                .on(Table::OrderQueue)
                .matches(&change)
        );
    }

    #[test]
    fn with_column_does_not_overwrite() {
        let change = order_change()
            .with_column("restaurant_id", "other")
            .with_column("table_id", "t-9");
        assert_eq!(change.column("restaurant_id").as_deref(), Some("r-1"));
        assert_eq!(change.column("table_id").as_deref(), Some("t-9"));
    }

    #[tokio::test]
    async fn feed_delivers_in_publish_order() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        feed.publish(order_change());
        feed.publish(order_change().with_column("seq", 2));

        assert!(rx.recv().await.unwrap().column("seq").is_none());
        assert_eq!(rx.recv().await.unwrap().column("seq").as_deref(), Some("2"));
    }

    #[test]
    fn publish_without_subscribers_is_ok() {
        let feed = ChangeFeed::default();
        feed.publish(order_change());
        assert_eq!(feed.subscriber_count(), 0);
    }
}
