//! Retry classification and backoff for bulk requests.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ApiError;

/// Message the controller returns while its configuration lock is held.
const LOCK_SENTINEL: &str = "system is currently being modified";

/// Whether a failed bulk request is worth retrying.
///
/// Retriable: the controller-lock payload sentinel, HTTP 5xx, 408, and 429.
/// Everything else (4xx, transport, decode, timeout) is fatal on first
/// occurrence.
pub fn is_retriable(err: &ApiError) -> bool {
    if let ApiError::Http { status, body, .. } = err {
        if let Ok(envelope) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(payload) = envelope.get("payload").and_then(|p| p.as_str()) {
                if payload.to_lowercase().contains(LOCK_SENTINEL) {
                    return true;
                }
            }
        }
        return *status >= 500 || *status == 408 || *status == 429;
    }
    false
}

/// Delay before retry attempt `attempt` (0-based): `initial * factor^attempt`,
/// capped at `max_delay`.
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = config.backoff_factor.powi(attempt as i32);
    let delay = config.initial_delay.mul_f64(factor);
    delay.min(config.max_delay)
}
