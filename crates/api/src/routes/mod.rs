//! HTTP route handlers.

pub mod events;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod orders;
pub mod performance;
pub mod sessions;

use std::str::FromStr;

use crate::error::ApiError;

/// Parses a path or query identifier, reporting which one was malformed.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}: {raw}")))
}
