//! Bounded exponential backoff with a per-attempt timeout.
//!
//! Shared by every source role and by persistence writes. Each attempt
//! is wrapped in `tokio::time::timeout`; transient failures sleep
//! `RetryPolicy::delay_for(attempt)` (extended by a rate-limit hint,
//! still capped at `max_delay`) before the next try.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::types::{ScannerError, SourceError};

/// Errors the retry loop knows how to classify.
pub trait Retryable: Display + Sized {
    fn is_transient(&self) -> bool;

    /// Extra delay requested by the upstream (rate-limit hint).
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Error reported when an attempt exceeds its timeout.
    fn timed_out(after: Duration) -> Self;
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        SourceError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    fn timed_out(after: Duration) -> Self {
        SourceError::Timeout(after)
    }
}

impl Retryable for ScannerError {
    fn is_transient(&self) -> bool {
        // A bad config or an unserializable record will not get better.
        !matches!(
            self,
            ScannerError::Config(_) | ScannerError::Serialization(_) | ScannerError::InvalidScore(_)
        )
    }

    fn timed_out(after: Duration) -> Self {
        ScannerError::Persistence(format!("write timed out after {after:?}"))
    }
}

/// Final result of a retried operation plus the attempts it took.
#[derive(Debug)]
pub struct Attempted<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Run `op` under `policy` until it succeeds, fails terminally, or the
/// attempt budget is spent.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Attempted<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut hint: Option<Duration> = None;
    let mut attempt = 0;

    loop {
        attempt += 1;

        if attempt > 1 {
            let base = policy.delay_for(attempt);
            let delay = (base + hint.take().unwrap_or(Duration::ZERO)).min(policy.max_delay());
            debug!(label, attempt, delay_ms = delay.as_millis() as u64, "Retrying");
            tokio::time::sleep(delay).await;
        }

        let outcome = match tokio::time::timeout(policy.timeout(), op()).await {
            Ok(res) => res,
            Err(_) => Err(E::timed_out(policy.timeout())),
        };

        match outcome {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if !e.is_transient() => {
                warn!(label, attempt, error = %e, "Terminal failure, not retrying");
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) if attempt >= max_attempts => {
                warn!(label, attempt, error = %e, "Retries exhausted");
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
            Err(e) => {
                debug!(label, attempt, error = %e, "Transient failure");
                hint = e.retry_after();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
