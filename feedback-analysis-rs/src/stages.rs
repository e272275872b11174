// feedback-analysis-rs/src/stages.rs
// One attempt of each generation stage
//
// Features:
// - Free-text descriptive analysis of the chronological record set
// - Schema-constrained conversion of that analysis to JSON
// - Parse, repair and validation of the converted document

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::credentials::Credential;
use crate::error::StageError;
use crate::generation::{GenerationClient, GenerationMode, GenerationParams};
use crate::model::{DescriptiveAnalysis, OrderedSessionSet, StructuredAnalysis};
use crate::prompts::{build_conversion_prompt, build_descriptive_prompt, TruncationLimits};
use crate::repair::parse_or_repair;
use crate::schema::response_schema;
use crate::taxonomy::SkillTaxonomy;
use crate::validation::SchemaValidator;

/// Stage one: free-text analysis
#[derive(Debug, Clone)]
pub struct DescriptiveAnalysisStage {
    client: GenerationClient,
    taxonomy: Arc<SkillTaxonomy>,
    limits: TruncationLimits,
    params: GenerationParams,
}

impl DescriptiveAnalysisStage {
    pub fn new(
        client: GenerationClient,
        taxonomy: Arc<SkillTaxonomy>,
        limits: TruncationLimits,
        params: GenerationParams,
    ) -> Self {
        Self {
            client,
            taxonomy,
            limits,
            params,
        }
    }

    pub fn build_prompt(&self, subject: &str, sessions: &OrderedSessionSet) -> String {
        build_descriptive_prompt(subject, sessions, &self.taxonomy, &self.limits)
    }

    /// Run one attempt with `credential`
    pub async fn attempt(
        &self,
        credential: &Credential,
        subject: &str,
        sessions: &OrderedSessionSet,
    ) -> Result<DescriptiveAnalysis, StageError> {
        let prompt = self.build_prompt(subject, sessions);
        debug!(subject, prompt_chars = prompt.chars().count(), "Requesting descriptive analysis");

        let text = self
            .client
            .generate(credential, &prompt, GenerationMode::FreeText, &self.params)
            .await?;

        info!(subject, chars = text.chars().count(), "Descriptive analysis received");
        Ok(DescriptiveAnalysis::new(text))
    }
}

/// A converted, validated document
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedAnalysis {
    pub analysis: StructuredAnalysis,
    pub repaired: bool,
}

/// Stage two: schema-constrained conversion
#[derive(Debug, Clone)]
pub struct StructuredConversionStage {
    client: GenerationClient,
    taxonomy: Arc<SkillTaxonomy>,
    validator: SchemaValidator,
    schema: Arc<Value>,
    params: GenerationParams,
}

impl StructuredConversionStage {
    pub fn new(client: GenerationClient, taxonomy: Arc<SkillTaxonomy>, params: GenerationParams) -> Self {
        let validator = SchemaValidator::new(&taxonomy);
        let schema = Arc::new(response_schema(&taxonomy));
        Self {
            client,
            taxonomy,
            validator,
            schema,
            params,
        }
    }

    pub fn build_prompt(
        &self,
        subject: &str,
        analysis: &DescriptiveAnalysis,
        sessions: &OrderedSessionSet,
    ) -> String {
        build_conversion_prompt(subject, analysis, sessions, &self.taxonomy)
    }

    /// Turn raw stage-two output into a typed analysis
    ///
    /// Parses (repairing if needed), validates, then deserializes. A
    /// repaired document goes through the same validation as any other.
    pub fn interpret(&self, raw: &str) -> Result<ConvertedAnalysis, StageError> {
        let parsed = parse_or_repair(raw)?;

        let report = self.validator.validate(&parsed.value);
        if !report.is_valid() {
            warn!(
                errors = report.errors().len(),
                repaired = parsed.repaired,
                "Structured analysis failed validation"
            );
            return Err(StageError::SchemaValidation(report.into_errors()));
        }

        let analysis = StructuredAnalysis::from_value(parsed.value)
            .map_err(|e| StageError::SchemaValidation(vec![e.to_string()]))?;

        Ok(ConvertedAnalysis {
            analysis,
            repaired: parsed.repaired,
        })
    }

    /// Run one attempt with `credential`
    pub async fn attempt(
        &self,
        credential: &Credential,
        subject: &str,
        analysis: &DescriptiveAnalysis,
        sessions: &OrderedSessionSet,
    ) -> Result<ConvertedAnalysis, StageError> {
        let prompt = self.build_prompt(subject, analysis, sessions);
        debug!(subject, prompt_chars = prompt.chars().count(), "Requesting structured conversion");

        let raw = self
            .client
            .generate(
                credential,
                &prompt,
                GenerationMode::SchemaJson(Arc::clone(&self.schema)),
                &self.params,
            )
            .await?;

        self.interpret(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_analysis_json;
    use crate::generation::{ChunkStream, GenerationError, MockGenerationTransport};
    use crate::model::FeedbackRecord;
    use chrono::NaiveDate;
    use futures::stream;

    fn chunks(parts: &[&str]) -> ChunkStream {
        let items: Vec<Result<String, GenerationError>> =
            parts.iter().map(|p| Ok(p.to_string())).collect();
        Box::pin(stream::iter(items))
    }

    fn sessions() -> OrderedSessionSet {
        OrderedSessionSet::new(vec![
            FeedbackRecord::new("1.1", NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(), "Strong hook."),
            FeedbackRecord::new("1.2", NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(), "Ran short."),
        ])
    }

    fn conversion(transport: MockGenerationTransport) -> StructuredConversionStage {
        StructuredConversionStage::new(
            GenerationClient::new(Arc::new(transport)),
            Arc::new(SkillTaxonomy::default()),
            GenerationParams::default(),
        )
    }

    #[tokio::test]
    async fn test_descriptive_attempt_uses_free_text_mode() {
        let mut transport = MockGenerationTransport::new();
        transport
            .expect_open_stream()
            .withf(|credential, request| {
                credential.expose() == "key-a"
                    && !request.mode.is_schema()
                    && request.prompt.contains("## SESSION 2 - 2024-02-10")
            })
            .times(1)
            .returning(|_, _| Ok(chunks(&["Avery ", "improved."])));

        let stage = DescriptiveAnalysisStage::new(
            GenerationClient::new(Arc::new(transport)),
            Arc::new(SkillTaxonomy::default()),
            TruncationLimits::default(),
            GenerationParams::default(),
        );

        let analysis = stage
            .attempt(&Credential::new("key-a"), "Avery", &sessions())
            .await
            .unwrap();
        assert_eq!(analysis.as_str(), "Avery improved.");
    }

    #[tokio::test]
    async fn test_conversion_attempt_sends_schema() {
        let doc = sample_analysis_json(&SkillTaxonomy::default(), 2).to_string();
        let mut transport = MockGenerationTransport::new();
        transport
            .expect_open_stream()
            .withf(|_, request| match &request.mode {
                GenerationMode::SchemaJson(schema) => schema["type"] == "OBJECT",
                GenerationMode::FreeText => false,
            })
            .times(1)
            .returning(move |_, _| Ok(chunks(&[doc.as_str()])));

        let converted = conversion(transport)
            .attempt(&Credential::new("k"), "Avery", &DescriptiveAnalysis::new("prose"), &sessions())
            .await
            .unwrap();
        assert!(!converted.repaired);
        assert_eq!(converted.analysis.skill_categories.len(), 7);
    }

    #[tokio::test]
    async fn test_conversion_propagates_generation_error() {
        let mut transport = MockGenerationTransport::new();
        transport
            .expect_open_stream()
            .returning(|_, _| {
                Err(GenerationError::Server {
                    status: 503,
                    message: "overloaded".to_string(),
                })
            });

        let result = conversion(transport)
            .attempt(&Credential::new("k"), "Avery", &DescriptiveAnalysis::new("prose"), &sessions())
            .await;
        assert!(matches!(result, Err(StageError::Generation(GenerationError::Server { status: 503, .. }))));
    }

    #[test]
    fn test_interpret_repairs_truncated_output() {
        let doc = sample_analysis_json(&SkillTaxonomy::default(), 2);
        let full = serde_json::to_string(&doc).unwrap();
        // reopen the document and cut it off inside a trailing string
        let truncated = format!("{}, \"notes\": \"the generator ran out of to", &full[..full.len() - 1]);

        let converted = conversion(MockGenerationTransport::new()).interpret(&truncated).unwrap();
        assert!(converted.repaired);
        assert_eq!(converted.analysis.recommendations.len(), 2);
    }

    #[test]
    fn test_interpret_rejects_invalid_structure() {
        let mut doc = sample_analysis_json(&SkillTaxonomy::default(), 2);
        doc.as_object_mut().unwrap().remove("recommendations");

        let err = conversion(MockGenerationTransport::new())
            .interpret(&doc.to_string())
            .unwrap_err();
        match err {
            StageError::SchemaValidation(errors) => {
                assert_eq!(errors, vec!["Missing recommendations".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_interpret_rejects_unrepairable_text() {
        let err = conversion(MockGenerationTransport::new())
            .interpret("I'm sorry, I can't help with that.")
            .unwrap_err();
        assert!(matches!(err, StageError::Unrepairable(_)));
    }
}
