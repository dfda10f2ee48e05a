use common::NotificationId;
use thiserror::Error;

/// Errors raised by notification storage.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(NotificationId),

    /// The backend is temporarily unreachable.
    #[error("Notification store unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown recipient type: {0}")]
    UnknownRecipientType(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NotificationError>;
