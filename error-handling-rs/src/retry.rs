//! # Retry Mechanism
//!
//! Bounded retries with exponential backoff, a hard per-attempt ceiling,
//! failover between interchangeable targets, and cooperative cancellation.
//!
//! Each attempt is a fresh future built by the caller's closure. When the
//! ceiling elapses or the cancellation token fires, the attempt future is
//! dropped, which aborts whatever I/O it had in flight.

use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::types::{AttemptFailure, AttemptRecord, FailureClass, RetryError, RetryableError};

/// Configuration for a retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub initial_backoff: Duration,

    /// Growth factor applied to the delay after every failure
    pub multiplier: f64,

    /// Upper bound for a single delay
    pub max_backoff: Duration,

    /// Jitter factor (0.0 - 1.0); 0.0 gives an exact doubling schedule
    pub randomization_factor: f64,

    /// Wall-clock ceiling for one attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
            randomization_factor: 0.0,
            attempt_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryConfig {
    /// Creates the exponential backoff policy for one retry loop
    ///
    /// The loop is bounded by `max_attempts`, so no elapsed-time limit is set.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(self.multiplier)
            .with_max_interval(self.max_backoff)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Delays that separate consecutive attempts (`max_attempts - 1` entries)
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (1..self.max_attempts.max(1))
            .map(|_| backoff.next_backoff().unwrap_or(self.max_backoff))
            .collect()
    }
}

/// A set of interchangeable targets an operation can fail over between
pub trait Failover: Send + Sync {
    /// Index of the target the next attempt should use
    fn current(&self) -> usize;

    /// Move away from the current target; returns the new index
    fn failover(&self) -> usize;
}

/// Single-target failover; rotation is a no-op
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFailover;

impl Failover for NoFailover {
    fn current(&self) -> usize {
        0
    }

    fn failover(&self) -> usize {
        0
    }
}

/// Handed to the unit of work at the start of every attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based attempt number
    pub number: u32,
    /// Failover target selected for this attempt
    pub target: usize,
}

/// A successful result and the number of attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// Runs a unit of work under a [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct RetryOrchestrator {
    config: RetryConfig,
}

impl RetryOrchestrator {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails fatally, runs out of
    /// attempts, or `cancel` fires.
    ///
    /// After a network-class failure the next attempt runs against
    /// `failover.failover()`. Every failure that leaves attempts remaining
    /// waits for the next backoff interval, whatever its class.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation_name: &str,
        failover: &dyn Failover,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<RetryOutcome<T>, RetryError<E>>
    where
        E: RetryableError,
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.backoff();
        let mut history: Vec<AttemptRecord> = Vec::with_capacity(max_attempts as usize);
        let mut number = 0;

        loop {
            number += 1;
            let target = failover.current();
            counter!("retry.attempts", 1, "operation" => operation_name.to_string());
            debug!(
                operation = %operation_name,
                attempt = number,
                max_attempts,
                target,
                "Starting attempt"
            );

            let call = operation(Attempt { number, target });
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(operation = %operation_name, attempt = number, "Cancelled during attempt");
                    return Err(RetryError::Cancelled { attempts: number });
                }
                result = timeout(self.config.attempt_timeout, call) => result,
            };

            let failure = match result {
                Ok(Ok(value)) => {
                    if number > 1 {
                        info!(
                            operation = %operation_name,
                            attempts = number,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(RetryOutcome { value, attempts: number });
                }
                Ok(Err(err)) if !err.class().is_retryable() => {
                    counter!("retry.failures", 1,
                        "operation" => operation_name.to_string(),
                        "class" => FailureClass::Fatal.as_str());
                    error!(
                        operation = %operation_name,
                        attempt = number,
                        error = %err,
                        "Non-retryable failure"
                    );
                    return Err(RetryError::Fatal { attempts: number, error: err });
                }
                Ok(Err(err)) => AttemptFailure::Failed(err),
                Err(_) => AttemptFailure::TimedOut(self.config.attempt_timeout),
            };

            let class = failure.class();
            counter!("retry.failures", 1,
                "operation" => operation_name.to_string(),
                "class" => class.as_str());

            if number >= max_attempts {
                history.push(AttemptRecord {
                    attempt: number,
                    target,
                    class,
                    error: failure.to_string(),
                    backoff: None,
                });
                counter!("retry.exhausted", 1, "operation" => operation_name.to_string());
                error!(
                    operation = %operation_name,
                    attempts = number,
                    error = %failure,
                    "All attempts failed"
                );
                for record in &history {
                    debug!(
                        operation = %operation_name,
                        attempt = record.attempt,
                        target = record.target,
                        class = %record.class,
                        error = %record.error,
                        "Attempt history"
                    );
                }
                return Err(RetryError::Exhausted { attempts: number, last: failure });
            }

            if class.triggers_failover() {
                let next = failover.failover();
                info!(
                    operation = %operation_name,
                    from = target,
                    to = next,
                    "Failing over after network failure"
                );
            }

            let delay = backoff.next_backoff().unwrap_or(self.config.max_backoff);
            warn!(
                operation = %operation_name,
                attempt = number,
                class = %class,
                backoff_ms = delay.as_millis() as u64,
                error = %failure,
                "Attempt failed, retrying"
            );
            history.push(AttemptRecord {
                attempt: number,
                target,
                class,
                error: failure.to_string(),
                backoff: Some(delay),
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(operation = %operation_name, attempt = number, "Cancelled during backoff");
                    return Err(RetryError::Cancelled { attempts: number });
                }
                _ = sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct TestError {
        class: FailureClass,
        message: String,
    }

    impl TestError {
        fn new(class: FailureClass, message: &str) -> Self {
            Self { class, message: message.to_string() }
        }
    }

    impl RetryableError for TestError {
        fn class(&self) -> FailureClass {
            self.class
        }
    }

    #[derive(Default)]
    struct Counter {
        cursor: AtomicUsize,
    }

    impl Failover for Counter {
        fn current(&self) -> usize {
            self.cursor.load(Ordering::SeqCst)
        }

        fn failover(&self) -> usize {
            self.cursor.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            ..RetryConfig::default()
        }
    }

    #[test]
    fn test_default_schedule_doubles() {
        let config = RetryConfig::default();
        assert_eq!(
            config.backoff_schedule(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );

        let five = RetryConfig { max_attempts: 4, ..RetryConfig::default() };
        assert_eq!(
            five.backoff_schedule(),
            vec![Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
        );
    }

    #[tokio::test]
    async fn test_retry_success_after_network_failures() {
        let orchestrator = RetryOrchestrator::new(fast_config());
        let failover = Counter::default();
        let attempts = Arc::new(AtomicU32::new(0));
        let targets = Arc::new(Mutex::new(Vec::new()));

        let result = orchestrator
            .run("test", &failover, &CancellationToken::new(), |attempt| {
                let attempts = attempts.clone();
                let targets = targets.clone();
                async move {
                    targets.lock().unwrap().push(attempt.target);
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TestError::new(FailureClass::Network, "socket hang up"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, "done");
        assert_eq!(result.attempts, 3);
        assert_eq!(failover.current(), 2);
        assert_eq!(*targets.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_parse_failures_do_not_fail_over() {
        let orchestrator = RetryOrchestrator::new(fast_config());
        let failover = Counter::default();

        let err = orchestrator
            .run("test", &failover, &CancellationToken::new(), |_| async {
                Err::<(), _>(TestError::new(FailureClass::Parse, "bad json"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 3);
        assert_eq!(failover.current(), 0);
        assert_eq!(err.to_string(), "failed after 3 attempts: bad json");
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let orchestrator = RetryOrchestrator::new(fast_config());
        let attempts = Arc::new(AtomicU32::new(0));

        let err = orchestrator
            .run("test", &NoFailover, &CancellationToken::new(), |_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError::new(FailureClass::Fatal, "misconfigured"))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Fatal { attempts: 1, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_with_non_decreasing_delays() {
        let orchestrator = RetryOrchestrator::default();
        let starts = Arc::new(Mutex::new(Vec::new()));

        let err = orchestrator
            .run("test", &NoFailover, &CancellationToken::new(), |_| {
                let starts = starts.clone();
                async move {
                    starts.lock().unwrap().push(Instant::now());
                    Err::<(), _>(TestError::new(FailureClass::Network, "fetch failed"))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);
        let first_gap = starts[1] - starts[0];
        let second_gap = starts[2] - starts[1];
        assert!(first_gap >= Duration::from_secs(2));
        assert!(second_gap >= first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_is_network_failure() {
        let orchestrator = RetryOrchestrator::default();
        let failover = Counter::default();
        let attempts = Arc::new(AtomicU32::new(0));

        let result = orchestrator
            .run("test", &failover, &CancellationToken::new(), |_| {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        sleep(Duration::from_secs(600)).await;
                    }
                    Ok::<_, TestError>(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(result.value, 7);
        assert_eq!(result.attempts, 2);
        assert_eq!(failover.current(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let orchestrator = RetryOrchestrator::default();
        let cancel = CancellationToken::new();
        let attempts = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let err = orchestrator
            .run("test", &NoFailover, &cancel, |_| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError::new(FailureClass::Network, "ECONNREFUSED"))
                }
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_work_completes() {
        let orchestrator = RetryOrchestrator::new(fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator
            .run("test", &NoFailover, &cancel, |_| async {
                Ok::<_, TestError>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }
}
