// ── Per-call retry ──
//
// Connection failures and 5xx responses are retried with exponential
// backoff; everything else is returned to the caller on the first try.
// 401 never reaches this layer: the transport refreshes and retries once.

use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use ztbctl_api::{ApiResponse, Method, Transport};

use crate::config::RetryPolicy;
use crate::error::CoreError;

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
///
/// The jitter is seeded from the attempt number so runs are reproducible.
pub(crate) fn calculate_backoff(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = policy.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(policy.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

/// Sleep for `delay` unless `cancel` fires first.
pub(crate) async fn cancellable_sleep(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), CoreError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CoreError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Issue one API call, retrying transient failures.
///
/// A 5xx that persists past the attempt ceiling is returned as the final
/// response so the caller can classify it like any other rejection.
pub async fn call_with_retry<T: Transport>(
    transport: &T,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    method: Method,
    path: &str,
    body: Option<&Value>,
) -> Result<ApiResponse, CoreError> {
    let mut sent = 0;
    call_counting_attempts(transport, policy, cancel, method, path, body, &mut sent).await
}

/// [`call_with_retry`], adding every request put on the wire to `sent`.
/// The count is kept even when the call ends in an error.
pub async fn call_counting_attempts<T: Transport>(
    transport: &T,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    method: Method,
    path: &str,
    body: Option<&Value>,
    sent: &mut u32,
) -> Result<ApiResponse, CoreError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        *sent += 1;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CoreError::Cancelled),
            result = transport.call(method.clone(), path, body) => result,
        };

        let reason = match outcome {
            Ok(resp) if resp.is_server_error() => {
                if attempt >= max_attempts {
                    return Ok(resp);
                }
                resp.message()
            }
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_transient() => {
                if attempt >= max_attempts {
                    return Err(CoreError::RetriesExhausted {
                        operation: format!("{method} {path}"),
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
                e.to_string()
            }
            Err(e) => return Err(e.into()),
        };

        let delay = calculate_backoff(attempt - 1, policy);
        tracing::warn!(
            %method,
            path,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            %reason,
            "transient failure, retrying"
        );
        cancellable_sleep(delay, cancel).await?;
    }
}
