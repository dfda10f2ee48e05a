//! Table reservation service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{RestaurantId, SessionId, TableId};
use domain::CustomerInfo;
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// A table held for a dining session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub restaurant_id: RestaurantId,
    pub table_id: TableId,
    pub session_id: SessionId,
    pub contact: CustomerInfo,
}

/// Table bookkeeping. Calls are best-effort from the engine's side.
#[async_trait]
pub trait TableReservationService: Send + Sync {
    /// Marks the table occupied by the session.
    async fn reserve(&self, request: &ReservationRequest) -> Result<(), ServiceError>;

    /// Frees the table held by the session.
    async fn release(
        &self,
        restaurant_id: RestaurantId,
        table_id: TableId,
        session_id: SessionId,
    ) -> Result<(), ServiceError>;
}

/// In-memory reservation service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTableReservationService {
    reservations: Arc<RwLock<HashMap<TableId, ReservationRequest>>>,
    fail_on_reserve: Arc<AtomicBool>,
    fail_on_release: Arc<AtomicBool>,
}

impl InMemoryTableReservationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail reserve calls.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.fail_on_reserve.store(fail, Ordering::SeqCst);
    }

    /// Configures the service to fail release calls.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.fail_on_release.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of tables currently held.
    pub async fn reservation_count(&self) -> usize {
        self.reservations.read().await.len()
    }

    /// Returns the session holding a table, if any.
    pub async fn holder(&self, table_id: TableId) -> Option<SessionId> {
        self.reservations
            .read()
            .await
            .get(&table_id)
            .map(|r| r.session_id)
    }
}

#[async_trait]
impl TableReservationService for InMemoryTableReservationService {
    async fn reserve(&self, request: &ReservationRequest) -> Result<(), ServiceError> {
        if self.fail_on_reserve.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("reservation service offline".to_string()));
        }
        let mut reservations = self.reservations.write().await;
        match reservations.get(&request.table_id) {
            Some(existing) if existing.session_id != request.session_id => {
                Err(ServiceError::Rejected(format!(
                    "table {} is held by session {}",
                    request.table_id, existing.session_id
                )))
            }
            _ => {
                reservations.insert(request.table_id, request.clone());
                Ok(())
            }
        }
    }

    async fn release(
        &self,
        _restaurant_id: RestaurantId,
        table_id: TableId,
        session_id: SessionId,
    ) -> Result<(), ServiceError> {
        if self.fail_on_release.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("reservation service offline".to_string()));
        }
        let mut reservations = self.reservations.write().await;
        if reservations
            .get(&table_id)
            .is_some_and(|r| r.session_id == session_id)
        {
            reservations.remove(&table_id);
        }
        Ok(())
    }
}
