//! # Failure Classification
//!
//! Closed classification of attempt failures, plus the error values the
//! retry orchestrator surfaces once it gives up.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a failed attempt should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureClass {
    /// Timeouts, connection failures, rate limiting, empty responses.
    /// Retried after rotating to the next credential.
    Network,
    /// Output that could not be parsed, even after repair
    Parse,
    /// Output that parsed but is missing required content
    Validation,
    /// The upstream service refused the request for a non-transient reason
    Upstream,
    /// Never retried
    Fatal,
}

impl FailureClass {
    /// Returns true if another attempt may succeed
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureClass::Fatal)
    }

    /// Returns true if the next attempt should use a different credential
    pub fn triggers_failover(self) -> bool {
        matches!(self, FailureClass::Network)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureClass::Network => "network",
            FailureClass::Parse => "parse",
            FailureClass::Validation => "validation",
            FailureClass::Upstream => "upstream",
            FailureClass::Fatal => "fatal",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trait for errors produced by a retried unit of work
pub trait RetryableError: StdError {
    /// Classification used to pick the retry strategy
    fn class(&self) -> FailureClass;
}

/// Why a single attempt failed
#[derive(Debug)]
pub enum AttemptFailure<E> {
    /// The unit of work returned an error
    Failed(E),
    /// The per-attempt ceiling elapsed and the call was dropped
    TimedOut(Duration),
}

impl<E: RetryableError> AttemptFailure<E> {
    /// Timer expiry counts as a network failure
    pub fn class(&self) -> FailureClass {
        match self {
            AttemptFailure::Failed(e) => e.class(),
            AttemptFailure::TimedOut(_) => FailureClass::Network,
        }
    }
}

impl<E: fmt::Display> fmt::Display for AttemptFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Failed(e) => write!(f, "{}", e),
            AttemptFailure::TimedOut(limit) => {
                write!(f, "attempt timed out after {}s", limit.as_secs_f64())
            }
        }
    }
}

impl<E: StdError + 'static> StdError for AttemptFailure<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            AttemptFailure::Failed(e) => Some(e),
            AttemptFailure::TimedOut(_) => None,
        }
    }
}

/// Bookkeeping for one iteration of the retry loop
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// Failover target (credential index) the attempt ran against
    pub target: usize,
    pub class: FailureClass,
    pub error: String,
    /// Delay scheduled before the next attempt, if there is one
    pub backoff: Option<Duration>,
}

/// Terminal outcome of a retried operation that did not succeed
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; only the last failure is kept
    Exhausted { attempts: u32, last: AttemptFailure<E> },
    /// A failure classified as fatal stopped the loop early
    Fatal { attempts: u32, error: E },
    /// The cancellation token fired during an attempt or a backoff wait
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of attempts started before the loop ended
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Fatal { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, last } => {
                write!(f, "failed after {} attempts: {}", attempts, last)
            }
            RetryError::Fatal { attempts, error } => {
                write!(f, "fatal error on attempt {}: {}", attempts, error)
            }
            RetryError::Cancelled { attempts } => {
                write!(f, "cancelled during attempt {}", attempts)
            }
        }
    }
}

impl<E: StdError + 'static> StdError for RetryError<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Fatal { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom(FailureClass);

    impl RetryableError for Boom {
        fn class(&self) -> FailureClass {
            self.0
        }
    }

    #[test]
    fn test_failure_class_policy() {
        assert!(FailureClass::Network.triggers_failover());
        assert!(!FailureClass::Parse.triggers_failover());
        assert!(!FailureClass::Validation.triggers_failover());
        assert!(FailureClass::Validation.is_retryable());
        assert!(!FailureClass::Fatal.is_retryable());
    }

    #[test]
    fn test_timeout_is_network_class() {
        let failure: AttemptFailure<Boom> = AttemptFailure::TimedOut(Duration::from_secs(120));
        assert_eq!(failure.class(), FailureClass::Network);
        assert_eq!(failure.to_string(), "attempt timed out after 120s");
    }

    #[test]
    fn test_retry_error_display_keeps_last_message() {
        let err = RetryError::Exhausted {
            attempts: 3,
            last: AttemptFailure::Failed(Boom(FailureClass::Parse)),
        };
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.to_string(), "failed after 3 attempts: boom");
        assert!(err.source().is_some());
    }
}
