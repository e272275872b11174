//! # Feedback Analysis
//!
//! Turns a subject's chronological feedback records into a validated,
//! machine-readable skill analysis using a remote text generator.
//!
//! The work happens in two passes. A free-text pass reasons over the
//! records; a schema-constrained pass converts that reasoning into JSON.
//! Each pass retries on its own with exponential backoff, rotates API
//! credentials after network failures, and is bounded by a per-attempt
//! timeout. Truncated JSON from the second pass is repaired when possible
//! and always validated before it is returned.
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedback_analysis::{AnalysisPipeline, FeedbackRecord, PipelineConfig};
//! use feedback_analysis::generation::GeminiTransport;
//!
//! # async fn run(records: Vec<FeedbackRecord>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_env();
//! let transport = GeminiTransport::new(&config.api_base_url, &config.model)?;
//! let pipeline = AnalysisPipeline::new(Arc::new(transport), ["api-key"], config)?;
//! let report = pipeline.analyze("Avery", &records).await?;
//! println!("{}", serde_json::to_string_pretty(&report.analysis)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod enhance;
pub mod error;
pub mod generation;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod repair;
pub mod schema;
pub mod stages;
pub mod taxonomy;
pub mod validation;

pub use config::PipelineConfig;
pub use credentials::{Credential, CredentialPool};
pub use error::{AnalysisError, ConfigurationError, Stage, StageError};
pub use generation::{GenerationClient, GenerationError, GenerationMode, GenerationParams, GenerationTransport};
pub use model::{
    AnalysisReport, DescriptiveAnalysis, FeedbackRecord, OrderedSessionSet, Recommendation, SkillCategory,
    StructuredAnalysis,
};
pub use pipeline::AnalysisPipeline;
pub use stages::{DescriptiveAnalysisStage, StructuredConversionStage};
pub use taxonomy::SkillTaxonomy;
pub use validation::{SchemaValidator, ValidationReport};
