mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use feedback_analysis::generation::{ScriptedReply, ScriptedTransport};
use feedback_analysis::{
    AnalysisError, AnalysisPipeline, CredentialPool, GenerationError, PipelineConfig, SkillTaxonomy, Stage,
};
use tokio_util::sync::CancellationToken;

use common::{five_sessions, valid_analysis};

fn config() -> PipelineConfig {
    PipelineConfig::default()
}

fn server_error() -> GenerationError {
    GenerationError::Server {
        status: 503,
        message: "model overloaded".to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_five_sessions_over_three_months() -> Result<()> {
    let mut doc = valid_analysis(&SkillTaxonomy::default(), 5);
    if let Some(root) = doc.as_object_mut() {
        root.remove("timeSpan");
    }

    let transport = Arc::new(
        ScriptedTransport::new()
            .on_free_text(ScriptedReply::text("Avery has grown steadily across the term."))
            .on_schema(ScriptedReply::json(&doc)),
    );
    let pipeline = AnalysisPipeline::new(transport.clone(), ["key-1"], config())?;

    let report = pipeline.analyze("Avery", &five_sessions()).await?;
    let analysis = &report.analysis;

    assert_eq!(analysis.total_sessions, 5);
    assert_eq!(analysis.time_span, "2024-01-08 to 2024-03-14");
    assert_eq!(analysis.skill_categories.len(), 7);
    assert!(analysis.recommendations[0].id.starts_with("rec_"));

    let trend: Vec<u32> = analysis.skill_categories["deliverySkills"]
        .chronological_trend
        .iter()
        .map(|p| p.session)
        .collect();
    assert_eq!(trend, vec![1, 2]);

    let first_prompt = &transport.recorded()[0].prompt;
    let order: Vec<usize> = ["2024-01-08", "2024-01-22", "2024-02-05", "2024-02-26", "2024-03-14"]
        .iter()
        .map(|d| first_prompt.find(d).expect("session date in prompt"))
        .collect();
    assert!(order.windows(2).all(|w| w[0] < w[1]), "sessions out of order");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_recommendations_exhausts_structured_stage() {
    let mut doc = valid_analysis(&SkillTaxonomy::default(), 5);
    if let Some(root) = doc.as_object_mut() {
        root.remove("recommendations");
    }

    let transport = Arc::new(
        ScriptedTransport::new()
            .on_free_text(ScriptedReply::text("prose"))
            .on_schema(ScriptedReply::json(&doc)),
    );
    let pipeline = AnalysisPipeline::new(transport.clone(), ["key-1"], config()).unwrap();

    let started = tokio::time::Instant::now();
    let err = pipeline.analyze("Avery", &five_sessions()).await.unwrap_err();

    match &err {
        AnalysisError::ExhaustedRetries {
            stage,
            attempts,
            last_error,
        } => {
            assert_eq!(*stage, Stage::Structured);
            assert_eq!(*attempts, 3);
            assert!(last_error.contains("Missing recommendations"), "{}", last_error);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(transport.free_text_calls(), 1);
    assert_eq!(transport.schema_calls(), 3);
    // 2s + 4s of backoff between the three structured attempts
    assert!(started.elapsed() >= Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_document_missing_nested_fields_is_not_accepted() {
    let mut doc = valid_analysis(&SkillTaxonomy::default(), 5);
    if let Some(categories) = doc["skillCategories"].as_object_mut() {
        for category in categories.values_mut() {
            if let Some(category) = category.as_object_mut() {
                category.remove("chronologicalTrend");
            }
        }
    }
    doc["patternAnalysis"] = serde_json::json!({});
    doc["overallProgression"] = serde_json::json!({"trend": "improving"});
    if let Some(strength) = doc["keyStrengths"][0].as_object_mut() {
        strength.remove("evidence");
        strength.remove("howToLeverage");
    }
    if let Some(base) = doc["recommendations"][0]["evidenceBase"].as_object_mut() {
        base.remove("patternIdentified");
        base.remove("sessionCount");
    }

    let transport = Arc::new(
        ScriptedTransport::new()
            .on_free_text(ScriptedReply::text("prose"))
            .on_schema(ScriptedReply::json(&doc)),
    );
    let pipeline = AnalysisPipeline::new(transport.clone(), ["key-1"], config()).unwrap();

    let err = pipeline.analyze("Avery", &five_sessions()).await.unwrap_err();
    match &err {
        AnalysisError::ExhaustedRetries { stage, last_error, .. } => {
            assert_eq!(*stage, Stage::Structured);
            assert!(
                last_error.contains("Missing chronologicalTrend for skill category"),
                "{}",
                last_error
            );
            assert!(last_error.contains("Missing repeatedIssues for patternAnalysis"), "{}", last_error);
            assert!(last_error.contains("Missing sessionCount for evidenceBase"), "{}", last_error);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(transport.schema_calls(), 3);
}

#[tokio::test]
async fn test_no_credentials_fails_before_any_call() {
    let transport = Arc::new(ScriptedTransport::new().on_free_text(ScriptedReply::text("unused")));
    let err = AnalysisPipeline::new(transport.clone(), Vec::<String>::new(), config()).unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_network_failure_rotates_credentials() -> Result<()> {
    let doc = valid_analysis(&SkillTaxonomy::default(), 5);
    let transport = Arc::new(
        ScriptedTransport::new()
            .on_free_text(ScriptedReply::Fail(server_error()))
            .on_free_text(ScriptedReply::text("prose"))
            .on_schema(ScriptedReply::text("Sorry, here is the analysis in prose instead."))
            .on_schema(ScriptedReply::json(&doc)),
    );
    let pipeline = AnalysisPipeline::new(transport.clone(), ["key-1", "key-2", "key-3"], config())?;

    let report = pipeline.analyze("Avery", &five_sessions()).await?;
    assert_eq!(report.descriptive_attempts, 2);
    assert_eq!(report.structured_attempts, 2);

    let credentials: Vec<String> = transport.recorded().into_iter().map(|c| c.credential).collect();
    // network failure moves on; a parse failure stays on the same key
    assert_eq!(credentials, vec!["key-1", "key-2", "key-2", "key-2"]);
    assert_eq!(pipeline.pool().cursor(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_truncated_json_is_repaired() -> Result<()> {
    let doc = valid_analysis(&SkillTaxonomy::default(), 5);
    let full = doc.to_string();
    let truncated = format!("{}, \"notes\": \"output was cut off mid-sen", &full[..full.len() - 1]);

    let transport = Arc::new(
        ScriptedTransport::new()
            .on_free_text(ScriptedReply::text("prose"))
            .on_schema(ScriptedReply::text(truncated)),
    );
    let pipeline = AnalysisPipeline::new(transport.clone(), ["key-1"], config())?;

    let report = pipeline.analyze("Avery", &five_sessions()).await?;
    assert!(report.repaired);
    assert_eq!(report.structured_attempts, 1);
    assert_eq!(report.analysis.recommendations.len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_hung_attempt_times_out_and_fails_over() -> Result<()> {
    let mut config = config();
    config.retry.attempt_timeout = Duration::from_secs(30);

    let transport = Arc::new(
        ScriptedTransport::new()
            .on_free_text(ScriptedReply::Hang)
            .on_free_text(ScriptedReply::text("prose"))
            .on_schema(ScriptedReply::json(&valid_analysis(&SkillTaxonomy::default(), 5))),
    );
    let pipeline = AnalysisPipeline::new(transport.clone(), ["key-1", "key-2"], config)?;

    let started = tokio::time::Instant::now();
    let report = pipeline.analyze("Avery", &five_sessions()).await?;

    assert_eq!(report.descriptive_attempts, 2);
    assert!(started.elapsed() >= Duration::from_secs(32));
    assert_eq!(transport.recorded()[1].credential, "key-2");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_stops_the_analysis() {
    let transport = Arc::new(ScriptedTransport::new().on_free_text(ScriptedReply::Hang));
    let pipeline = AnalysisPipeline::new(transport.clone(), ["key-1"], config()).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = pipeline
        .analyze_with_cancellation("Avery", &five_sessions(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Cancelled { stage: Stage::Descriptive }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_analyses_share_a_pool() -> Result<()> {
    let pool = Arc::new(CredentialPool::new(["key-1", "key-2"])?);
    let doc = valid_analysis(&SkillTaxonomy::default(), 5);

    let make = |doc: &serde_json::Value| -> Result<(Arc<ScriptedTransport>, AnalysisPipeline)> {
        let transport = Arc::new(
            ScriptedTransport::new()
                .on_free_text(ScriptedReply::text("prose"))
                .on_schema(ScriptedReply::json(doc)),
        );
        let pipeline = AnalysisPipeline::with_pool(transport.clone(), Arc::clone(&pool), config())?;
        Ok((transport, pipeline))
    };
    let (first_transport, first) = make(&doc)?;
    let (second_transport, second) = make(&doc)?;

    let records = five_sessions();
    let (a, b) = tokio::join!(first.analyze("Avery", &records), second.analyze("Blake", &records));

    assert_eq!(a?.analysis.total_sessions, 5);
    assert_eq!(b?.analysis.total_sessions, 5);
    assert_eq!(first_transport.calls(), 2);
    assert_eq!(second_transport.calls(), 2);
    assert_eq!(pool.cursor(), 0);
    Ok(())
}
