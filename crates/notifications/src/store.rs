use async_trait::async_trait;
use common::NotificationId;

use crate::{NotificationRecord, Recipient, Result};

/// Storage for notification records.
///
/// Records are append-only; the read flag is the only mutable column.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, record: NotificationRecord) -> Result<()>;

    /// Lists a recipient's notifications, newest first.
    async fn list(&self, recipient: Recipient, limit: Option<usize>)
    -> Result<Vec<NotificationRecord>>;

    async fn unread_count(&self, recipient: Recipient) -> Result<usize>;

    /// Marks one notification read. Returns the updated record.
    async fn mark_read(&self, id: NotificationId) -> Result<NotificationRecord>;

    /// Marks every notification of the recipient read and returns how many changed.
    async fn mark_all_read(&self, recipient: Recipient) -> Result<usize>;
}
