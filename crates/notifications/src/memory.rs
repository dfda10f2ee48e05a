use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use common::NotificationId;
use tokio::sync::RwLock;

use crate::{NotificationError, NotificationRecord, NotificationStore, Recipient, Result};

/// In-memory notification store for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    records: Arc<RwLock<Vec<NotificationRecord>>>,
    fail_next: Arc<AtomicU32>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` inserts fail.
    pub fn set_fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Makes every operation fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns every stored record in insertion order.
    pub async fn all(&self) -> Vec<NotificationRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(NotificationError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, record: NotificationRecord) -> Result<()> {
        self.check_available()?;
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(NotificationError::Unavailable("injected failure".to_string()));
        }
        self.records.write().await.push(record);
        Ok(())
    }

    async fn list(
        &self,
        recipient: Recipient,
        limit: Option<usize>,
    ) -> Result<Vec<NotificationRecord>> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.recipient == recipient)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn unread_count(&self, recipient: Recipient) -> Result<usize> {
        self.check_available()?;
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| r.recipient == recipient && !r.is_read)
            .count())
    }

    async fn mark_read(&self, id: NotificationId) -> Result<NotificationRecord> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(NotificationError::NotFound(id))?;
        record.is_read = true;
        Ok(record.clone())
    }

    async fn mark_all_read(&self, recipient: Recipient) -> Result<usize> {
        self.check_available()?;
        let mut records = self.records.write().await;
        let mut changed = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.recipient == recipient && !r.is_read)
        {
            record.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }
}
