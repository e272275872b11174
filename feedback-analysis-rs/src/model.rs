//! Data model: input records, the intermediate prose, and the typed result.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One evaluated unit of work for a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    /// Ordinal identifier of the unit, e.g. "3.2"
    pub unit: String,
    pub date: NaiveDate,
    #[serde(default, alias = "topic")]
    pub motion: Option<String>,
    pub content: String,
    #[serde(default)]
    pub best_aspects: Option<String>,
    #[serde(default)]
    pub improvement_areas: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    /// Rubric key to score; 0 means not applicable
    #[serde(default)]
    pub scores: BTreeMap<String, u8>,
}

impl FeedbackRecord {
    pub fn new(unit: impl Into<String>, date: NaiveDate, content: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            date,
            motion: None,
            content: content.into(),
            best_aspects: None,
            improvement_areas: None,
            comments: None,
            duration: None,
            scores: BTreeMap::new(),
        }
    }

    pub fn with_motion(mut self, motion: impl Into<String>) -> Self {
        self.motion = Some(motion.into());
        self
    }

    pub fn with_best_aspects(mut self, text: impl Into<String>) -> Self {
        self.best_aspects = Some(text.into());
        self
    }

    pub fn with_improvement_areas(mut self, text: impl Into<String>) -> Self {
        self.improvement_areas = Some(text.into());
        self
    }

    pub fn with_comments(mut self, text: impl Into<String>) -> Self {
        self.comments = Some(text.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn with_score(mut self, rubric: impl Into<String>, score: u8) -> Self {
        self.scores.insert(rubric.into(), score);
        self
    }
}

/// Records sorted ascending by date; records sharing a date keep input order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedSessionSet {
    records: Vec<FeedbackRecord>,
}

impl OrderedSessionSet {
    pub fn new(mut records: Vec<FeedbackRecord>) -> Self {
        records.sort_by_key(|r| r.date);
        Self { records }
    }

    pub fn from_records(records: &[FeedbackRecord]) -> Self {
        Self::new(records.to_vec())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedbackRecord> {
        self.records.iter()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// "<first date> to <last date>", or `None` for an empty set
    pub fn time_span(&self) -> Option<String> {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => Some(format!("{} to {}", first, last)),
            _ => None,
        }
    }
}

/// Free-form prose produced by the first generation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptiveAnalysis(String);

impl DescriptiveAnalysis {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DescriptiveAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validated result of the structured conversion pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAnalysis {
    #[serde(deserialize_with = "lenient_string")]
    pub subject_name: String,
    #[serde(deserialize_with = "lenient_count")]
    pub total_sessions: u32,
    #[serde(default)]
    pub time_span: String,
    #[serde(default)]
    pub key_strengths: Vec<KeyStrength>,
    pub skill_categories: BTreeMap<String, SkillCategory>,
    pub pattern_analysis: PatternAnalysis,
    pub overall_progression: OverallProgression,
    pub recommendations: Vec<Recommendation>,
}

impl StructuredAnalysis {
    /// Typed view of an already validated JSON document
    ///
    /// Explicit nulls are treated as absent so optional fields take their
    /// defaults.
    pub fn from_value(mut value: Value) -> Result<Self, serde_json::Error> {
        prune_nulls(&mut value);
        serde_json::from_value(value)
    }

    /// Recommendations whose skill matches any of `focus_skills`
    /// (case-insensitive substring match)
    pub fn recommendations_for<S: AsRef<str>>(&self, focus_skills: &[S]) -> Vec<&Recommendation> {
        let focus: Vec<String> = focus_skills
            .iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        self.recommendations
            .iter()
            .filter(|rec| {
                let skill = rec.skill.to_lowercase();
                focus.iter().any(|f| skill.contains(f.as_str()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStrength {
    #[serde(deserialize_with = "lenient_string")]
    pub strength_name: String,
    /// established / emerging / unique
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub how_to_leverage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillCategory {
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub current_level: String,
    #[serde(deserialize_with = "lenient_string")]
    pub progress: String,
    #[serde(deserialize_with = "lenient_string")]
    pub consistency: String,
    pub evidence: Vec<String>,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub chronological_trend: Vec<TrendPoint>,
}

/// Observation of one skill at one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    #[serde(deserialize_with = "lenient_count")]
    pub session: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub level: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub evidence: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternAnalysis {
    #[serde(default)]
    pub repeated_issues: Vec<RepeatedIssue>,
    #[serde(default)]
    pub recent_concerns: Vec<RecentConcern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepeatedIssue {
    #[serde(deserialize_with = "lenient_string")]
    pub issue: String,
    #[serde(default)]
    pub root_cause: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub frequency: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub severity: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentConcern {
    #[serde(deserialize_with = "lenient_string")]
    pub concern: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub urgency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgression {
    #[serde(deserialize_with = "lenient_string")]
    pub trend: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consistency: String,
    #[serde(default)]
    pub breakthrough_moments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Filled in during enhancement when the generator leaves it out
    #[serde(default)]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(deserialize_with = "lenient_string")]
    pub skill: String,
    #[serde(deserialize_with = "lenient_string")]
    pub priority: String,
    #[serde(deserialize_with = "lenient_string")]
    pub target_issue: String,
    #[serde(deserialize_with = "lenient_string")]
    pub diagnosis: String,
    #[serde(deserialize_with = "lenient_string")]
    pub recommendation: String,
    #[serde(deserialize_with = "lenient_string")]
    pub rationale: String,
    pub evidence_base: EvidenceBase,
    pub action_items: ActionItems,
    pub measurable_goals: MeasurableGoals,
    pub success_indicators: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub timeframe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_context: Option<PatternContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceBase {
    #[serde(default, deserialize_with = "lenient_count")]
    pub session_count: u32,
    #[serde(default)]
    pub pattern_identified: String,
    pub supporting_quotes: Vec<String>,
    #[serde(default)]
    pub timeframe_covered: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItems {
    pub preparation_focus: Vec<String>,
    pub practice_exercises: Vec<String>,
    pub next_session_objectives: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurableGoals {
    pub short_term: Vec<String>,
    pub medium_term: Vec<String>,
    pub long_term: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternContext {
    #[serde(default, deserialize_with = "lenient_string")]
    pub issue_frequency: String,
    #[serde(default)]
    pub root_cause_analysis: String,
    #[serde(default)]
    pub potential_underlying_factors: Vec<String>,
}

/// Result of a completed analysis, with diagnostics about how it was produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub analysis: StructuredAnalysis,
    pub descriptive_analysis: DescriptiveAnalysis,
    pub session_count: usize,
    /// Characters in the first-stage prompt
    pub prompt_length: usize,
    pub descriptive_attempts: u32,
    pub structured_attempts: u32,
    /// The final JSON only parsed after repair
    pub repaired: bool,
}

fn prune_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(prune_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(prune_nulls),
        _ => {}
    }
}

// Generators occasionally emit a level like 3 where a label is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid count {}", n))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| D::Error::custom(format!("invalid count {:?}", s))),
        other => Err(D::Error::custom(format!("expected a count, found {}", other))),
    }
}
