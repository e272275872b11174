//! Prompt assembly for both generation passes.
//!
//! Every narrative field is cut to a fixed character ceiling before it is
//! inserted, so prompt size grows linearly with the number of records and
//! never with the verbosity of any single record.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::model::{DescriptiveAnalysis, FeedbackRecord, OrderedSessionSet};
use crate::taxonomy::SkillTaxonomy;

/// Character ceilings applied to record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationLimits {
    /// Main narrative content
    pub content: usize,
    /// Best aspects, improvement areas, comments
    pub field: usize,
    /// Topic / motion line
    pub topic: usize,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self {
            content: 1000,
            field: 300,
            topic: 100,
        }
    }
}

/// First `limit` characters of `text`, never splitting a character
pub fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// One `## SESSION` block
pub fn render_session(
    index: usize,
    record: &FeedbackRecord,
    taxonomy: &SkillTaxonomy,
    limits: &TruncationLimits,
) -> String {
    let mut block = String::new();
    let _ = writeln!(block, "## SESSION {} - {}", index, record.date);
    let _ = writeln!(block, "**Unit:** {}", record.unit);
    if let Some(motion) = non_blank(&record.motion) {
        let _ = writeln!(block, "**Motion:** {}", truncate_chars(motion, limits.topic));
    }
    if let Some(duration) = non_blank(&record.duration) {
        let _ = writeln!(block, "**Duration:** {}", duration);
    }

    let _ = writeln!(block, "\n**Rubric Scores:**\n{}", taxonomy.format_rubric_scores(&record.scores));

    let content = record.content.trim();
    let content = if content.is_empty() {
        "No content available"
    } else {
        truncate_chars(content, limits.content)
    };
    let _ = writeln!(block, "\n**Qualitative Feedback:**\n{}", content);

    let extras = [
        ("Best Aspects", &record.best_aspects),
        ("Areas for Improvement", &record.improvement_areas),
        ("Instructor Comments", &record.comments),
    ];
    let mut wrote_extra = false;
    for (label, field) in extras {
        if let Some(text) = non_blank(field) {
            if !wrote_extra {
                block.push('\n');
                wrote_extra = true;
            }
            let _ = writeln!(block, "**{}:** {}", label, truncate_chars(text, limits.field));
        }
    }

    block
}

/// Prompt for the free-text analysis pass
pub fn build_descriptive_prompt(
    subject: &str,
    sessions: &OrderedSessionSet,
    taxonomy: &SkillTaxonomy,
    limits: &TruncationLimits,
) -> String {
    let count = sessions.len();
    let span = sessions.time_span().unwrap_or_default();

    let session_data = sessions
        .iter()
        .enumerate()
        .map(|(i, record)| render_session(i + 1, record, taxonomy, limits))
        .collect::<Vec<_>>()
        .join("\n---\n\n");

    format!(
        r#"# Chronological Performance Analysis for {subject}

You are an experienced coach reviewing {count} feedback sessions for {subject}, covering {span}. Sessions are listed oldest first.

## Rubric

Sessions may carry numeric rubric scores (1-{max}, or N/A when a rubric did not apply):

{rubrics}
Read the scores and the written feedback together. Scores show the trend; the written feedback explains it.

## What to Produce

### 1. Key strengths
Name 3-5 strengths {subject} shows. Say whether each is established, emerging or unique, quote the feedback that supports it, and explain how to build on it.

### 2. Skill assessment
Assess each of these skills in chronological order:
{skills}
For every skill give the current level (Novice, Developing, Proficient or Advanced), the direction of travel (improving, stable, declining or breakthrough), how consistent performance is (high, medium or low), quoted evidence, and session-by-session observations.

### 3. Diagnostic patterns
For each recurring issue describe what happens, the most likely root cause, how it shows up, how often it occurs and how severe it is. List recent concerns separately with their urgency.

### 4. Overall progression
Describe the overall trend, how consistent performance is, and any breakthrough moments.

### 5. Recommendations
Give 3-5 recommendations. Each needs the target issue, the diagnosis behind it, what to do, why that addresses the root cause, concrete preparation and practice steps, short, medium and long-term goals, success indicators and a realistic timeframe.

Base every statement on quotes from the feedback below.

**CHRONOLOGICAL FEEDBACK DATA ({count} sessions):**

{session_data}
Work through the sessions in order before writing your analysis."#,
        max = taxonomy.max_score,
        rubrics = taxonomy.describe_rubrics(),
        skills = taxonomy.describe_skills(),
    )
}

/// Prompt for the schema-constrained conversion pass
///
/// Restates the session count and time span so the generator does not have
/// to recompute them from the prose.
pub fn build_conversion_prompt(
    subject: &str,
    analysis: &DescriptiveAnalysis,
    sessions: &OrderedSessionSet,
    taxonomy: &SkillTaxonomy,
) -> String {
    let skill_keys = taxonomy.skill_keys().collect::<Vec<_>>().join(", ");
    let skill_total = taxonomy.skills.len();
    let count = sessions.len();
    let span = sessions.time_span().unwrap_or_default();

    format!(
        r#"# Convert Analysis to Structured Format

Re-express the analysis below as a single JSON object. Keep every strength, diagnosis and recommendation; do not summarise them away.

## Analysis
{analysis}

## Output Fields

- **subjectName**: "{subject}"
- **totalSessions**: {count}
- **timeSpan**: "{span}"
- **keyStrengths**: array of {{strengthName, type (established/emerging/unique), evidence (array of quotes), howToLeverage}}
- **skillCategories**: object with exactly these {skill_total} keys: {skill_keys}
- **patternAnalysis**: {{repeatedIssues, recentConcerns}}
- **overallProgression**: {{trend, consistency, breakthroughMoments (array)}}
- **recommendations**: array of recommendation objects

Each skill category has:
- name, currentLevel (Novice/Developing/Proficient/Advanced), progress (improving/stable/declining/breakthrough), consistency (high/medium/low)
- evidence: array of quotes
- pattern: the overall pattern in one or two sentences
- chronologicalTrend: array of {{session (1-based session number), level, date, evidence}}

Each repeated issue has issue, rootCause, frequency, severity and symptoms (array). Each recent concern has concern, urgency and, if known, rootCause.

Each recommendation has:
- id, category (immediate_action/skill_development/long_term_mastery), skill, priority (high/medium/low)
- targetIssue, diagnosis, recommendation, rationale
- evidenceBase: {{sessionCount, patternIdentified, supportingQuotes (array), timeframeCovered}}
- actionItems: {{preparationFocus, practiceExercises, nextSessionObjectives}} (arrays)
- measurableGoals: {{shortTerm, mediumTerm, longTerm}} (arrays)
- successIndicators: array
- timeframe
- patternContext: {{issueFrequency, rootCauseAnalysis, potentialUnderlyingFactors (array)}}
"#
    )
}
