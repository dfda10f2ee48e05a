//! Human-readable order numbers: `ORD-<epoch millis>-<6-char token>`.

use chrono::{DateTime, Utc};
use rand::Rng;

const PREFIX: &str = "ORD";
const TOKEN_LEN: usize = 6;
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates an order number stamped with `now`.
///
/// Uniqueness is enforced by the store; callers regenerate on collision.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let token: String = (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect();
    format!("{PREFIX}-{}-{token}", now.timestamp_millis())
}

/// Returns true if `value` has the order number shape.
pub fn is_valid_order_number(value: &str) -> bool {
    let mut parts = value.splitn(3, '-');
    let (Some(prefix), Some(millis), Some(token)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == PREFIX
        && !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && token.len() == TOKEN_LEN
        && token.bytes().all(|b| TOKEN_CHARSET.contains(&b))
}
