//! Bounded exponential-backoff retry for calendar operations.
//!
//! Each attempt moves through
//! `Pending -> Attempting -> {Success | Retrying -> Attempting | Failed}`.
//! Errors are classified by message: transient network, timeout, 429/5xx and
//! provider rate-limit failures are retried, everything else fails at once.

use std::future::Future;
use std::time::Duration;

use slotwise_core::Error;
use slotwise_core::constants::{RETRY_ATTEMPTS, RETRY_BASE_DELAY_MS};
use tracing::{debug, warn};

/// Lowercase substrings that mark an error as transient.
const RETRYABLE_MARKERS: &[&str] = &[
    // network
    "enetunreach",
    "network is unreachable",
    "network unreachable",
    "econnreset",
    "connection reset",
    "econnrefused",
    "connection refused",
    "etimedout",
    "timeout",
    "timed out",
    // http status
    "http 429",
    "http 502",
    "http 503",
    "http 504",
    "too many requests",
    "bad gateway",
    "service unavailable",
    "gateway timeout",
    // provider rate limits
    "ratelimitexceeded",
    "userratelimitexceeded",
    "rate limit",
    "quotaexceeded",
    "quota exceeded",
];

/// Lowercase substrings of a provider reply saying the event no longer exists.
const GONE_MARKERS: &[&str] = &["http 404", "http 410", "resource has been deleted"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

pub fn classify_error(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if RETRYABLE_MARKERS.iter().any(|m| lower.contains(m)) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

/// True when the provider reports the target event as missing or deleted.
pub fn is_gone(message: &str) -> bool {
    let lower = message.to_lowercase();
    GONE_MARKERS.iter().any(|m| lower.contains(m))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Attempting(u32),
    Retrying { attempt: u32, delay: Duration },
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryCoordinator {
    policy: RetryPolicy,
}

impl RetryCoordinator {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.run_traced(label, op).await.0
    }

    /// Like [`RetryCoordinator::run`], also returning every state visited.
    pub async fn run_traced<T, F, Fut>(&self, label: &str, mut op: F) -> (Result<T, Error>, Vec<AttemptState>)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut trace = vec![AttemptState::Pending];
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            trace.push(AttemptState::Attempting(attempt));
            debug!(op = label, attempt, "sync attempt");

            let err = match op(attempt).await {
                Ok(value) => {
                    trace.push(AttemptState::Success);
                    return (Ok(value), trace);
                }
                Err(e) => e,
            };

            let message = format!("{err:#}");
            if classify_error(&message) == ErrorClass::Fatal {
                warn!(op = label, attempt, error = %message, "fatal sync error");
                trace.push(AttemptState::Failed);
                return (Err(Error::FatalSync(format!("{label}: {message}"))), trace);
            }

            if attempt >= max {
                warn!(op = label, attempts = attempt, error = %message, "retries exhausted");
                trace.push(AttemptState::Failed);
                return (
                    Err(Error::TransientSync(format!(
                        "{label} failed after {attempt} attempts: {message}"
                    ))),
                    trace,
                );
            }

            let delay = self.policy.delay(attempt);
            debug!(op = label, attempt, delay_ms = delay.as_millis() as u64, error = %message, "retrying");
            trace.push(AttemptState::Retrying { attempt, delay });
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn classifies_by_marker() {
        assert_eq!(classify_error("upstream returned HTTP 503"), ErrorClass::Retryable);
        assert_eq!(classify_error("Invalid signature"), ErrorClass::Fatal);
        assert_eq!(classify_error("ECONNRESET while reading"), ErrorClass::Retryable);
        assert_eq!(classify_error("Rate Limit Exceeded"), ErrorClass::Retryable);
        assert_eq!(classify_error("HTTP 404: not found"), ErrorClass::Fatal);
    }

    #[test]
    fn recognizes_missing_events() {
        assert!(is_gone("delete: HTTP 410: event local-1 already deleted"));
        assert!(is_gone("HTTP 404 Not Found"));
        assert!(!is_gone("HTTP 403 Forbidden"));
        assert!(!is_gone("HTTP 503 Service Unavailable"));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay(1), Duration::from_millis(1000));
        assert_eq!(p.delay(2), Duration::from_millis(2000));
        assert_eq!(p.delay(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let started = tokio::time::Instant::now();

        let (res, trace) = RetryCoordinator::default()
            .run_traced("create", move |_| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("connection reset by peer")
                    }
                    Ok("evt-1")
                }
            })
            .await;

        assert_eq!(res.unwrap(), "evt-1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff, virtual time.
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
        assert_eq!(trace.first(), Some(&AttemptState::Pending));
        assert_eq!(trace.last(), Some(&AttemptState::Success));
        assert!(trace.contains(&AttemptState::Retrying {
            attempt: 2,
            delay: Duration::from_millis(2000)
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let res: Result<(), Error> = RetryCoordinator::default()
            .run("update", move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("HTTP 503 Service Unavailable"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let err = res.unwrap_err();
        assert_eq!(err.code(), "TRANSIENT_SYNC_ERROR");
        assert!(err.to_string().contains("after 3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let (res, trace) = RetryCoordinator::default()
            .run_traced("create", move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("Invalid signature"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(res.unwrap_err().code(), "FATAL_SYNC_ERROR");
        assert_eq!(
            trace,
            vec![AttemptState::Pending, AttemptState::Attempting(1), AttemptState::Failed]
        );
    }
}
