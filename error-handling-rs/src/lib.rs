//! # Error Handling Framework
//!
//! Resilience building blocks shared by the analysis services: failure
//! classification, a retry orchestrator with exponential backoff,
//! per-attempt timeouts, failover and cancellation, structured logging
//! bootstrap, and secret redaction for surfaced error text.

pub mod logging;
pub mod retry;
pub mod sanitization;
pub mod types;

// Re-export commonly used types
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use retry::{Attempt, Failover, NoFailover, RetryConfig, RetryOrchestrator, RetryOutcome};
pub use sanitization::{redact, sanitize_message};
pub use types::{AttemptFailure, AttemptRecord, FailureClass, RetryError, RetryableError};
