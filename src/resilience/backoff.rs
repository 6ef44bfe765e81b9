//! Exponential backoff for repeated accept failures.
//!
//! Keeps an acceptor from spinning on a persistent error condition (for
//! example, hitting the open-file ulimit) and flooding the logs.

use std::time::Duration;

/// Delay applied after the second consecutive failure, in milliseconds.
pub const INITIAL_ERROR_DELAY_MS: u64 = 50;

/// Ceiling for the failure delay, in milliseconds.
pub const MAX_ERROR_DELAY_MS: u64 = 1600;

/// Compute the delay to apply on the next failure.
///
/// The first failure in a run is not delayed; after that the delay doubles
/// on every consecutive failure until it reaches the ceiling.
pub fn next_delay(current_ms: u64) -> u64 {
    if current_ms == 0 {
        INITIAL_ERROR_DELAY_MS
    } else {
        current_ms.saturating_mul(2).min(MAX_ERROR_DELAY_MS)
    }
}

/// Sleep for the current delay (if any), then return the delay to store
/// for the next failure. Callers reset their stored delay to zero on the
/// first successful accept.
pub async fn delay_on_failure(current_ms: u64) -> u64 {
    if current_ms > 0 {
        tokio::time::sleep(Duration::from_millis(current_ms)).await;
    }
    next_delay(current_ms)
}
