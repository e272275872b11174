// feedback-analysis-rs/src/config.rs
// Pipeline configuration, loaded from the environment

use std::time::Duration;

use config_rs::{get_env_string, get_env_var};
use error_handling_rs::RetryConfig;
use tracing::debug;

use crate::error::ConfigurationError;
use crate::generation::gemini::{DEFAULT_API_BASE_URL, DEFAULT_MODEL};
use crate::generation::{GenerationParams, ReasoningBudget};
use crate::prompts::TruncationLimits;
use crate::taxonomy::SkillTaxonomy;

/// Settings for one [`crate::AnalysisPipeline`]
///
/// Environment variables (all optional):
///
/// | Variable | Default |
/// |---|---|
/// | `GEMINI_API_URL` | `https://generativelanguage.googleapis.com/v1beta` |
/// | `ANALYSIS_MODEL` | `gemini-2.5-flash` |
/// | `ANALYSIS_MAX_ATTEMPTS` | 3 |
/// | `ANALYSIS_INITIAL_BACKOFF_MS` | 2000 |
/// | `ANALYSIS_ATTEMPT_TIMEOUT_SECS` | 120 |
/// | `ANALYSIS_MAX_OUTPUT_TOKENS` | 32768 |
/// | `ANALYSIS_DESCRIPTIVE_TEMPERATURE` | 0.7 |
/// | `ANALYSIS_STRUCTURED_TEMPERATURE` | 0.3 |
/// | `ANALYSIS_THINKING_BUDGET` | -1 (unlimited) |
/// | `ANALYSIS_CONTENT_CHAR_LIMIT` | 1000 |
/// | `ANALYSIS_FIELD_CHAR_LIMIT` | 300 |
/// | `ANALYSIS_TOPIC_CHAR_LIMIT` | 100 |
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub api_base_url: String,
    pub model: String,
    pub retry: RetryConfig,
    pub descriptive: GenerationParams,
    pub structured: GenerationParams,
    pub limits: TruncationLimits,
    pub taxonomy: SkillTaxonomy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryConfig::default(),
            descriptive: GenerationParams {
                temperature: 0.7,
                ..GenerationParams::default()
            },
            structured: GenerationParams {
                temperature: 0.3,
                ..GenerationParams::default()
            },
            limits: TruncationLimits::default(),
            taxonomy: SkillTaxonomy::default(),
        }
    }
}

impl PipelineConfig {
    /// Read overrides from the environment on top of the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let retry = RetryConfig {
            max_attempts: get_env_var("ANALYSIS_MAX_ATTEMPTS", defaults.retry.max_attempts),
            initial_backoff: Duration::from_millis(get_env_var(
                "ANALYSIS_INITIAL_BACKOFF_MS",
                defaults.retry.initial_backoff.as_millis() as u64,
            )),
            attempt_timeout: Duration::from_secs(get_env_var(
                "ANALYSIS_ATTEMPT_TIMEOUT_SECS",
                defaults.retry.attempt_timeout.as_secs(),
            )),
            ..defaults.retry
        };

        let max_output_tokens = get_env_var(
            "ANALYSIS_MAX_OUTPUT_TOKENS",
            defaults.descriptive.max_output_tokens,
        );
        let reasoning = ReasoningBudget::from_i64(get_env_var(
            "ANALYSIS_THINKING_BUDGET",
            defaults.descriptive.reasoning.as_i64(),
        ));

        let config = Self {
            api_base_url: get_env_string("GEMINI_API_URL", &defaults.api_base_url),
            model: get_env_string("ANALYSIS_MODEL", &defaults.model),
            retry,
            descriptive: GenerationParams {
                temperature: get_env_var(
                    "ANALYSIS_DESCRIPTIVE_TEMPERATURE",
                    defaults.descriptive.temperature,
                ),
                max_output_tokens,
                reasoning,
            },
            structured: GenerationParams {
                temperature: get_env_var(
                    "ANALYSIS_STRUCTURED_TEMPERATURE",
                    defaults.structured.temperature,
                ),
                max_output_tokens,
                reasoning,
            },
            limits: TruncationLimits {
                content: get_env_var("ANALYSIS_CONTENT_CHAR_LIMIT", defaults.limits.content),
                field: get_env_var("ANALYSIS_FIELD_CHAR_LIMIT", defaults.limits.field),
                topic: get_env_var("ANALYSIS_TOPIC_CHAR_LIMIT", defaults.limits.topic),
            },
            taxonomy: defaults.taxonomy,
        };

        debug!(
            model = %config.model,
            max_attempts = config.retry.max_attempts,
            attempt_timeout_secs = config.retry.attempt_timeout.as_secs(),
            "Loaded pipeline configuration"
        );
        config
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        fn invalid(name: &str, reason: impl Into<String>) -> ConfigurationError {
            ConfigurationError::InvalidValue {
                name: name.to_string(),
                reason: reason.into(),
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("ANALYSIS_MAX_ATTEMPTS", "must be at least 1"));
        }
        if self.retry.attempt_timeout.is_zero() {
            return Err(invalid("ANALYSIS_ATTEMPT_TIMEOUT_SECS", "must be greater than zero"));
        }
        for (name, params) in [
            ("ANALYSIS_DESCRIPTIVE_TEMPERATURE", &self.descriptive),
            ("ANALYSIS_STRUCTURED_TEMPERATURE", &self.structured),
        ] {
            if !(0.0..=2.0).contains(&params.temperature) {
                return Err(invalid(name, format!("{} is outside 0.0..=2.0", params.temperature)));
            }
        }
        if self.descriptive.max_output_tokens == 0 {
            return Err(invalid("ANALYSIS_MAX_OUTPUT_TOKENS", "must be greater than zero"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("ANALYSIS_MODEL", "must not be empty"));
        }
        if self.taxonomy.skills.is_empty() {
            return Err(invalid("taxonomy", "at least one skill is required"));
        }
        Ok(())
    }
}
