//! Loyalty service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{CustomerId, OrderId, RestaurantId};
use domain::Money;
use tokio::sync::RwLock;

use crate::error::ServiceError;

/// Points granted for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointsAward {
    pub points: u64,
    pub balance: u64,
}

/// Point accrual for registered customers.
#[async_trait]
pub trait LoyaltyService: Send + Sync {
    async fn award_points(
        &self,
        customer_id: CustomerId,
        restaurant_id: RestaurantId,
        order_id: OrderId,
        order_total: Money,
    ) -> Result<PointsAward, ServiceError>;
}

/// In-memory loyalty service: one point per whole currency unit.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoyaltyService {
    balances: Arc<RwLock<HashMap<CustomerId, u64>>>,
    awarded: Arc<RwLock<Vec<OrderId>>>,
    fail_on_award: Arc<AtomicBool>,
}

impl InMemoryLoyaltyService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_award(&self, fail: bool) {
        self.fail_on_award.store(fail, Ordering::SeqCst);
    }

    pub async fn balance(&self, customer_id: CustomerId) -> u64 {
        self.balances
            .read()
            .await
            .get(&customer_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl LoyaltyService for InMemoryLoyaltyService {
    async fn award_points(
        &self,
        customer_id: CustomerId,
        _restaurant_id: RestaurantId,
        order_id: OrderId,
        order_total: Money,
    ) -> Result<PointsAward, ServiceError> {
        if self.fail_on_award.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("loyalty service offline".to_string()));
        }

        let mut awarded = self.awarded.write().await;
        let mut balances = self.balances.write().await;
        let balance = balances.entry(customer_id).or_insert(0);
        if awarded.contains(&order_id) {
            return Ok(PointsAward {
                points: 0,
                balance: *balance,
            });
        }

        let points = order_total.amount().max(0.0).floor() as u64;
        *balance += points;
        awarded.push(order_id);
        Ok(PointsAward {
            points,
            balance: *balance,
        })
    }
}
