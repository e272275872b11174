// feedback-analysis-rs/src/pipeline.rs
// Two-stage analysis with per-stage retries and credential failover
//
// Features:
// - Descriptive -> Structured -> Validated -> Done, one retry scope per stage
// - Credential rotation after network-class failures
// - Hard per-attempt timeout and cooperative cancellation
// - Safe to share across concurrent analyses

use std::sync::Arc;

use error_handling_rs::{RetryError, RetryOrchestrator, RetryableError};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::credentials::CredentialPool;
use crate::enhance::enhance;
use crate::error::{AnalysisError, Stage};
use crate::generation::{GeminiTransport, GenerationClient, GenerationTransport};
use crate::model::{AnalysisReport, DescriptiveAnalysis, FeedbackRecord, OrderedSessionSet, StructuredAnalysis};
use crate::stages::{ConvertedAnalysis, DescriptiveAnalysisStage, StructuredConversionStage};

enum State {
    Descriptive,
    Structured {
        descriptive: DescriptiveAnalysis,
        attempts: u32,
    },
    Validated {
        descriptive: DescriptiveAnalysis,
        converted: ConvertedAnalysis,
        descriptive_attempts: u32,
        structured_attempts: u32,
    },
    Done(AnalysisReport),
}

/// Produces a [`StructuredAnalysis`] from a subject's feedback records
///
/// Credential selection is sticky: every attempt uses the credential at the
/// shared pool cursor, and only a network-class failure moves the cursor
/// on. Successful analyses therefore keep using the same key until it
/// fails, rather than spreading load across the pool. Callers that want
/// plain round-robin distribution can draw keys with
/// [`CredentialPool::next`] themselves.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    pool: Arc<CredentialPool>,
    orchestrator: RetryOrchestrator,
    descriptive: DescriptiveAnalysisStage,
    structured: StructuredConversionStage,
}

impl AnalysisPipeline {
    /// Build a pipeline over `transport` with its own credential pool
    ///
    /// # Errors
    /// `AnalysisError::Configuration` if no usable credential is supplied or
    /// `config` fails validation
    pub fn new<I, S>(
        transport: Arc<dyn GenerationTransport>,
        credentials: I,
        config: PipelineConfig,
    ) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pool = CredentialPool::new(credentials)?;
        Self::with_pool(transport, Arc::new(pool), config)
    }

    /// Build a pipeline that shares `pool` with other pipelines
    pub fn with_pool(
        transport: Arc<dyn GenerationTransport>,
        pool: Arc<CredentialPool>,
        config: PipelineConfig,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;

        let client = GenerationClient::new(transport);
        let taxonomy = Arc::new(config.taxonomy);
        let descriptive = DescriptiveAnalysisStage::new(
            client.clone(),
            Arc::clone(&taxonomy),
            config.limits,
            config.descriptive,
        );
        let structured = StructuredConversionStage::new(client, taxonomy, config.structured);

        Ok(Self {
            pool,
            orchestrator: RetryOrchestrator::new(config.retry),
            descriptive,
            structured,
        })
    }

    /// Gemini transport with credentials from the environment
    pub fn from_config(config: PipelineConfig) -> Result<Self, AnalysisError> {
        let pool = CredentialPool::from_env()?;
        let transport = GeminiTransport::new(&config.api_base_url, &config.model)?;
        Self::with_pool(Arc::new(transport), Arc::new(pool), config)
    }

    pub fn from_env() -> Result<Self, AnalysisError> {
        Self::from_config(PipelineConfig::from_env())
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    /// Analyze `records` for `subject`
    pub async fn analyze(
        &self,
        subject: &str,
        records: &[FeedbackRecord],
    ) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_with_cancellation(subject, records, &CancellationToken::new())
            .await
    }

    /// Analyze `records` for `subject`, stopping early if `cancel` fires
    ///
    /// Records are ordered by date before anything else happens. An empty
    /// record set is rejected without contacting the generation service.
    ///
    /// # Errors
    /// - `AnalysisError::EmptyInput` for an empty record set
    /// - `AnalysisError::ExhaustedRetries` when a stage uses up its attempts
    ///   or hits a fatal failure
    /// - `AnalysisError::Cancelled` when `cancel` fires
    #[instrument(skip(self, records, cancel), fields(records = records.len()))]
    pub async fn analyze_with_cancellation(
        &self,
        subject: &str,
        records: &[FeedbackRecord],
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, AnalysisError> {
        if records.is_empty() {
            warn!(subject, "No feedback records supplied");
            return Err(AnalysisError::EmptyInput {
                subject: subject.to_string(),
            });
        }

        let sessions = OrderedSessionSet::from_records(records);
        let prompt_length = self.descriptive.build_prompt(subject, &sessions).chars().count();
        info!(
            subject,
            sessions = sessions.len(),
            prompt_chars = prompt_length,
            "Starting analysis"
        );

        let mut state = State::Descriptive;
        loop {
            state = match state {
                State::Descriptive => {
                    let sessions = &sessions;
                    let outcome = self
                        .orchestrator
                        .run(Stage::Descriptive.as_str(), self.pool.as_ref(), cancel, move |attempt| {
                            let credential = self.pool.get(attempt.target).clone();
                            async move { self.descriptive.attempt(&credential, subject, sessions).await }
                        })
                        .await
                        .map_err(|e| self.stage_error(Stage::Descriptive, e))?;

                    State::Structured {
                        descriptive: outcome.value,
                        attempts: outcome.attempts,
                    }
                }
                State::Structured { descriptive, attempts } => {
                    let (analysis, sessions) = (&descriptive, &sessions);
                    let outcome = self
                        .orchestrator
                        .run(Stage::Structured.as_str(), self.pool.as_ref(), cancel, move |attempt| {
                            let credential = self.pool.get(attempt.target).clone();
                            async move {
                                self.structured
                                    .attempt(&credential, subject, analysis, sessions)
                                    .await
                            }
                        })
                        .await
                        .map_err(|e| self.stage_error(Stage::Structured, e))?;

                    State::Validated {
                        descriptive,
                        converted: outcome.value,
                        descriptive_attempts: attempts,
                        structured_attempts: outcome.attempts,
                    }
                }
                State::Validated {
                    descriptive,
                    converted,
                    descriptive_attempts,
                    structured_attempts,
                } => {
                    let ConvertedAnalysis { mut analysis, repaired } = converted;
                    enhance(&mut analysis, &sessions);

                    State::Done(AnalysisReport {
                        analysis,
                        descriptive_analysis: descriptive,
                        session_count: sessions.len(),
                        prompt_length,
                        descriptive_attempts,
                        structured_attempts,
                        repaired,
                    })
                }
                State::Done(report) => {
                    info!(
                        subject,
                        recommendations = report.analysis.recommendations.len(),
                        descriptive_attempts = report.descriptive_attempts,
                        structured_attempts = report.structured_attempts,
                        repaired = report.repaired,
                        "Analysis complete"
                    );
                    return Ok(report);
                }
            };
        }
    }

    /// Convenience wrapper returning only the structured analysis
    pub async fn analyze_structured(
        &self,
        subject: &str,
        records: &[FeedbackRecord],
    ) -> Result<StructuredAnalysis, AnalysisError> {
        Ok(self.analyze(subject, records).await?.analysis)
    }

    fn stage_error<E: RetryableError>(&self, stage: Stage, err: RetryError<E>) -> AnalysisError {
        match err {
            RetryError::Cancelled { .. } => AnalysisError::Cancelled { stage },
            RetryError::Exhausted { attempts, last } => AnalysisError::ExhaustedRetries {
                stage,
                attempts,
                last_error: self.pool.redact(&last.to_string()),
            },
            RetryError::Fatal { attempts, error } => AnalysisError::ExhaustedRetries {
                stage,
                attempts,
                last_error: self.pool.redact(&error.to_string()),
            },
        }
    }
}
