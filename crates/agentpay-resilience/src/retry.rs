//! Bounded exponential backoff for dependency initialization
//!
//! Calls through a [`crate::CircuitBreaker`] are never retried; this helper
//! exists only for constructing workflow dependencies (stores, processors)
//! where a transient startup failure is worth a few more attempts.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `op` up to `max_attempts` times, sleeping `2^attempt` seconds between
/// attempts. The closure receives the 1-based attempt number.
pub async fn with_backoff<T, E, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                let delay = Duration::from_secs(1u64 << attempt);
                warn!(attempt, %e, ?delay, "initialization failed, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
