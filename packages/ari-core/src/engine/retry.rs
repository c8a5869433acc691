//! Retry logic for transient engine errors.

use std::future::Future;
use std::time::Duration;

use super::EngineResult;
use crate::protocol_constants::ENGINE_RETRY_DELAYS_MS;

/// Executes an engine request, retrying transient failures.
///
/// Retries on timeouts, connection failures and gateway-type status codes
/// with backoff (200ms, 500ms, 1000ms). Non-transient errors are returned
/// immediately.
///
/// # Arguments
/// * `action` - Action name for logging
/// * `operation` - Closure that performs the request
pub(crate) async fn with_retry<T, F, Fut>(action: &str, mut operation: F) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<T>>,
{
    let attempts = ENGINE_RETRY_DELAYS_MS.len() + 1;
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(r) => return Ok(r),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay_ms = ENGINE_RETRY_DELAYS_MS[attempt - 1];
                log::warn!("[Engine] {} transient error: {}", action, e);
                log::info!(
                    "[Engine] Retrying {} (attempt {}/{}) after {}ms",
                    action,
                    attempt + 1,
                    attempts,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
