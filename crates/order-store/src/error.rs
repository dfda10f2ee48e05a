use common::RestaurantId;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The order number is already used within the restaurant.
    #[error("Duplicate order number {order_number} for restaurant {restaurant_id}")]
    Duplicate {
        restaurant_id: RestaurantId,
        order_number: String,
    },

    /// The backend is temporarily unreachable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A transient failure persisted through every retry attempt.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Protocol(_)
            ),
            _ => false,
        }
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!StoreError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!StoreError::not_found("Order", "x").is_transient());
        assert!(
            !StoreError::RetriesExhausted {
                operation: "get_order",
                attempts: 3,
                source: Box::new(StoreError::Unavailable("down".into())),
            }
            .is_transient()
        );
    }

    #[test]
    fn retries_exhausted_message_includes_cause() {
        let err = StoreError::RetriesExhausted {
            operation: "create_order",
            attempts: 3,
            source: Box::new(StoreError::Unavailable("connection refused".into())),
        };
        assert_eq!(
            err.to_string(),
            "create_order failed after 3 attempts: Store unavailable: connection refused"
        );
    }
}
