//! Workflow error types.

use common::{OrderId, SessionId};
use domain::{OrderStatus, ValidationErrors};
use order_store::StoreError;
use thiserror::Error;

/// Errors surfaced by workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The request violated one or more input rules.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// A concurrent mutation changed the order first.
    #[error("Conflict on order {order_id} (currently {current_status}): {reason}")]
    Conflict {
        order_id: OrderId,
        current_status: OrderStatus,
        reason: String,
    },

    /// Order not found.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// The target status is not reachable from the current one.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The order store failed, after retries for transient failures.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl WorkflowError {
    /// Returns true if the caller can fix the request and resubmit it.
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Validation(_) | WorkflowError::InvalidTransition { .. }
        )
    }

    /// Returns true if the same request may succeed later: a lost race
    /// (re-read and retry) or a store outage.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Conflict { .. } => true,
            WorkflowError::Persistence(err) => {
                err.is_transient() || matches!(err, StoreError::RetriesExhausted { .. })
            }
            _ => false,
        }
    }
}

/// Failure of an external collaborator (staff directory, table
/// reservations, loyalty). Never returned from order operations.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::ValidationIssue;

    #[test]
    fn validation_is_caller_correctable() {
        let err = WorkflowError::from(ValidationErrors::from(ValidationIssue::EmptyCart));
        assert!(err.is_caller_correctable());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Cart cannot be empty"));
    }

    #[test]
    fn conflict_is_retryable() {
        let err = WorkflowError::Conflict {
            order_id: OrderId::new(),
            current_status: OrderStatus::Accepted,
            reason: "already accepted".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_caller_correctable());
    }

    #[test]
    fn exhausted_retries_are_system_failures() {
        let err = WorkflowError::from(StoreError::RetriesExhausted {
            operation: "create_order",
            attempts: 3,
            source: Box::new(StoreError::Unavailable("down".to_string())),
        });
        assert!(err.is_retryable());
        assert!(!err.is_caller_correctable());
    }
}
