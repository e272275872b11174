// feedback-analysis-rs/src/error.rs
// Error types for the analysis pipeline

use std::fmt;

use error_handling_rs::{FailureClass, RetryableError};
use thiserror::Error;

use crate::generation::GenerationError;

/// Which retry scope of the pipeline an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Descriptive,
    Structured,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Descriptive => "descriptive analysis",
            Stage::Structured => "structured conversion",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Problems detected while assembling the pipeline. Never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no API credentials available; set GEMINI_API_KEY_1..N, GEMINI_API_KEY or GOOGLE_AI_API_KEY")]
    NoCredentials,

    #[error("invalid configuration value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failure of a single stage attempt; consumed by the retry loop
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("JSON parsing and repair both failed: {0}")]
    Unrepairable(String),

    #[error("invalid analysis structure: {}", .0.join(", "))]
    SchemaValidation(Vec<String>),
}

impl RetryableError for StageError {
    fn class(&self) -> FailureClass {
        match self {
            StageError::Generation(e) => e.class(),
            StageError::Malformed(_) | StageError::Unrepairable(_) => FailureClass::Parse,
            StageError::SchemaValidation(_) => FailureClass::Validation,
        }
    }
}

/// Errors returned to callers of [`crate::AnalysisPipeline`]
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("no feedback records supplied for {subject}")]
    EmptyInput { subject: String },

    /// Every attempt of a stage failed. Carries only the last failure.
    #[error("{stage} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        stage: Stage,
        attempts: u32,
        last_error: String,
    },

    #[error("{stage} was cancelled")]
    Cancelled { stage: Stage },
}

impl AnalysisError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, AnalysisError::Configuration(_))
    }

    /// Attempt count for exhausted stages, zero otherwise
    pub fn attempts(&self) -> u32 {
        match self {
            AnalysisError::ExhaustedRetries { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_classes() {
        assert_eq!(
            StageError::Generation(GenerationError::EmptyResponse).class(),
            FailureClass::Network
        );
        assert_eq!(StageError::Unrepairable("eof".into()).class(), FailureClass::Parse);
        assert_eq!(
            StageError::SchemaValidation(vec!["Missing recommendations".into()]).class(),
            FailureClass::Validation
        );
    }

    #[test]
    fn test_schema_validation_message_lists_fields() {
        let err = StageError::SchemaValidation(vec![
            "Missing recommendations".to_string(),
            "Missing skill category: deliverySkills".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "invalid analysis structure: Missing recommendations, Missing skill category: deliverySkills"
        );
    }

    #[test]
    fn test_exhausted_display() {
        let err = AnalysisError::ExhaustedRetries {
            stage: Stage::Structured,
            attempts: 3,
            last_error: "no response text received from the generation service".to_string(),
        };
        assert_eq!(err.attempts(), 3);
        assert!(err.to_string().starts_with("structured conversion failed after 3 attempts"));
    }
}
