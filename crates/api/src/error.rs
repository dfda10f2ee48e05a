//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use notifications::NotificationError;
use order_store::StoreError;
use workflow::WorkflowError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Workflow operation error.
    Workflow(WorkflowError),
    /// Notification store error.
    Notification(NotificationError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, Vec::new()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, Vec::new()),
            ApiError::Workflow(err) => workflow_error_to_response(err),
            ApiError::Notification(err) => {
                let (status, message) = notification_error_to_response(err);
                (status, message, Vec::new())
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, Vec::new())
            }
        };

        let body = if details.is_empty() {
            serde_json::json!({ "error": message })
        } else {
            serde_json::json!({ "error": message, "details": details })
        };
        (status, axum::Json(body)).into_response()
    }
}

fn workflow_error_to_response(err: WorkflowError) -> (StatusCode, String, Vec<String>) {
    match &err {
        WorkflowError::Validation(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "Validation failed".to_string(),
            errors.messages(),
        ),
        WorkflowError::NotFound(_) | WorkflowError::SessionNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string(), Vec::new())
        }
        WorkflowError::Conflict { .. } | WorkflowError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, err.to_string(), Vec::new())
        }
        WorkflowError::Persistence(StoreError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, err.to_string(), Vec::new())
        }
        WorkflowError::Persistence(store_err) => {
            tracing::error!(error = %store_err, "order store failure");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string(), Vec::new())
        }
    }
}

fn notification_error_to_response(err: NotificationError) -> (StatusCode, String) {
    match &err {
        NotificationError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        NotificationError::UnknownRecipientType(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => {
            tracing::error!(error = %err, "notification store failure");
            (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        ApiError::Notification(err)
    }
}
