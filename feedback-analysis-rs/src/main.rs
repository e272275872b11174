// feedback-analysis-rs/src/main.rs
// Command-line entry point: analyze one subject's feedback records file

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use error_handling_rs::{init_logging, LoggingConfig};
use feedback_analysis::{AnalysisPipeline, AnalysisReport, FeedbackRecord, PipelineConfig};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "feedback-analyzer")]
#[command(about = "Produce a structured skill analysis from chronological feedback records")]
struct Cli {
    /// Name of the person the feedback is about
    #[arg(short, long)]
    subject: String,

    /// JSON file holding an array of feedback records
    #[arg(short, long)]
    records: PathBuf,

    /// Write the analysis here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override ANALYSIS_MODEL
    #[arg(long)]
    model: Option<String>,

    /// Include the free-text analysis in the output
    #[arg(long)]
    include_descriptive: bool,

    /// Keep only recommendations for these skills
    #[arg(long = "focus", value_name = "SKILL")]
    focus: Vec<String>,
}

fn read_records(path: &Path) -> Result<Vec<FeedbackRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read records from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse records in {}", path.display()))
}

fn render(report: &AnalysisReport, include_descriptive: bool, focus: &[String]) -> Result<Value> {
    let mut output = serde_json::to_value(report).context("failed to serialize analysis")?;

    if !include_descriptive {
        if let Some(object) = output.as_object_mut() {
            object.remove("descriptiveAnalysis");
        }
    }

    if !focus.is_empty() {
        let focused = report.analysis.recommendations_for(focus);
        output["analysis"]["recommendations"] =
            serde_json::to_value(focused).context("failed to serialize recommendations")?;
    }

    Ok(output)
}

#[tokio::main]
async fn main() -> Result<()> {
    config_rs::load_dotenv();
    let cli = Cli::parse();

    init_logging(LoggingConfig::from_env("feedback-analyzer")).context("failed to initialise logging")?;

    let records = read_records(&cli.records)?;
    info!(subject = %cli.subject, records = records.len(), "Loaded feedback records");

    let mut config = PipelineConfig::from_env();
    if let Some(model) = cli.model.clone() {
        config.model = model;
    }
    let pipeline = AnalysisPipeline::from_config(config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling analysis");
            on_signal.cancel();
        }
    });

    let report = match pipeline
        .analyze_with_cancellation(&cli.subject, &records, &cancel)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Analysis failed");
            return Err(e.into());
        }
    };

    let output = render(&report, cli.include_descriptive, &cli.focus)?;
    let text = serde_json::to_string_pretty(&output)?;

    match &cli.output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "Analysis written");
        }
        None => println!("{}", text),
    }

    Ok(())
}
