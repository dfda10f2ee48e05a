//! Staff directory trait and in-memory implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{RestaurantId, StaffId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// A staff member as known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    /// Employed and allowed to take orders.
    pub active: bool,
    /// On shift and not on a break.
    pub available: bool,
}

impl StaffMember {
    /// Creates an active, available staff member.
    pub fn new(restaurant_id: RestaurantId, name: impl Into<String>) -> Self {
        Self {
            id: StaffId::new(),
            restaurant_id,
            name: name.into(),
            active: true,
            available: true,
        }
    }

    pub fn can_take_orders(&self) -> bool {
        self.active && self.available
    }
}

/// Query of staff by restaurant.
#[async_trait]
pub trait StaffDirectory: Send + Sync {
    /// Returns the restaurant's staff, in a stable order.
    async fn staff_for(&self, restaurant_id: RestaurantId) -> Result<Vec<StaffMember>, ServiceError>;
}

/// In-memory staff directory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStaffDirectory {
    members: Arc<RwLock<Vec<StaffMember>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStaffDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a staff member and returns its id.
    pub async fn add(&self, member: StaffMember) -> StaffId {
        let id = member.id;
        self.members.write().await.push(member);
        id
    }

    /// Marks a staff member as on or off shift.
    pub async fn set_available(&self, staff_id: StaffId, available: bool) {
        for member in self.members.write().await.iter_mut() {
            if member.id == staff_id {
                member.available = available;
            }
        }
    }

    pub async fn set_active(&self, staff_id: StaffId, active: bool) {
        for member in self.members.write().await.iter_mut() {
            if member.id == staff_id {
                member.active = active;
            }
        }
    }

    /// Makes every lookup fail until switched off.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl StaffDirectory for InMemoryStaffDirectory {
    async fn staff_for(&self, restaurant_id: RestaurantId) -> Result<Vec<StaffMember>, ServiceError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("staff directory offline".to_string()));
        }
        Ok(self
            .members
            .read()
            .await
            .iter()
            .filter(|m| m.restaurant_id == restaurant_id)
            .cloned()
            .collect())
    }
}
