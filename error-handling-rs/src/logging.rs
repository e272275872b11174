//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber. Library code only emits
//! events; binaries call [`init_logging`] once at startup.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to install global subscriber: {0}")]
    Install(String),
}

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub level: String,
    /// The service name attached to the startup event
    pub service_name: String,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Whether to include the event target
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "feedback-analyzer".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

impl LoggingConfig {
    /// Reads `LOG_LEVEL` and `LOG_FORMAT` (`json` or `text`)
    pub fn from_env(service_name: &str) -> Self {
        let defaults = Self::default();
        let format = config_rs::get_env_string("LOG_FORMAT", "text");
        Self {
            level: config_rs::get_env_string("LOG_LEVEL", &defaults.level),
            service_name: service_name.to_string(),
            json_format: format.eq_ignore_ascii_case("json"),
            with_target: config_rs::get_env_var("LOG_WITH_TARGET", defaults.with_target),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }
}

/// Initializes the structured logging system
///
/// Safe to call more than once; only the first call installs a subscriber.
/// `log` records are forwarded into `tracing`.
pub fn init_logging(config: LoggingConfig) -> Result<(), LoggingError> {
    // Don't re-initialize if already done
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let registry = Registry::default().with(config.filter());

    let installed = if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(config.with_target),
            )
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };

    if let Err(e) = installed {
        LOGGING_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(LoggingError::Install(e.to_string()));
    }

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}
