// feedback-analysis-rs/src/schema.rs
// Response schema sent with schema-constrained requests

use serde_json::{json, Map, Value};

use crate::taxonomy::SkillTaxonomy;

/// Required top-level fields; `timeSpan` is derivable and filled in
/// during enhancement when missing
pub const REQUIRED_TOP_LEVEL: &[&str] = &[
    "subjectName",
    "totalSessions",
    "keyStrengths",
    "skillCategories",
    "patternAnalysis",
    "overallProgression",
    "recommendations",
];

/// Text fields every recommendation must carry; `id` is assigned during
/// enhancement when missing
pub const REQUIRED_RECOMMENDATION_FIELDS: &[&str] = &[
    "category",
    "skill",
    "priority",
    "targetIssue",
    "diagnosis",
    "recommendation",
    "rationale",
    "timeframe",
];

fn string() -> Value {
    json!({ "type": "STRING" })
}

fn integer() -> Value {
    json!({ "type": "INTEGER" })
}

fn string_array() -> Value {
    json!({ "type": "ARRAY", "items": string() })
}

fn array_of(items: Value) -> Value {
    json!({ "type": "ARRAY", "items": items })
}

fn object(properties: Vec<(&str, Value)>, required: &[&str]) -> Value {
    let properties: Map<String, Value> = properties
        .into_iter()
        .map(|(name, schema)| (name.to_string(), schema))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    })
}

fn skill_category() -> Value {
    let trend_point = object(
        vec![
            ("session", integer()),
            ("level", string()),
            ("date", string()),
            ("evidence", string()),
        ],
        &["session", "level", "date", "evidence"],
    );

    object(
        vec![
            ("name", string()),
            ("currentLevel", string()),
            ("progress", string()),
            ("consistency", string()),
            ("evidence", string_array()),
            ("pattern", string()),
            ("chronologicalTrend", array_of(trend_point)),
        ],
        &[
            "name",
            "currentLevel",
            "progress",
            "consistency",
            "evidence",
            "chronologicalTrend",
        ],
    )
}

fn recommendation() -> Value {
    let evidence_base = object(
        vec![
            ("sessionCount", integer()),
            ("patternIdentified", string()),
            ("supportingQuotes", string_array()),
            ("timeframeCovered", string()),
        ],
        &["sessionCount", "patternIdentified", "supportingQuotes", "timeframeCovered"],
    );
    let action_items = object(
        vec![
            ("preparationFocus", string_array()),
            ("practiceExercises", string_array()),
            ("nextSessionObjectives", string_array()),
        ],
        &["preparationFocus", "practiceExercises", "nextSessionObjectives"],
    );
    let measurable_goals = object(
        vec![
            ("shortTerm", string_array()),
            ("mediumTerm", string_array()),
            ("longTerm", string_array()),
        ],
        &["shortTerm", "mediumTerm", "longTerm"],
    );
    let pattern_context = object(
        vec![
            ("issueFrequency", json!({ "type": "NUMBER" })),
            ("rootCauseAnalysis", string()),
            ("potentialUnderlyingFactors", string_array()),
        ],
        &["issueFrequency", "rootCauseAnalysis", "potentialUnderlyingFactors"],
    );

    let mut required: Vec<&str> = REQUIRED_RECOMMENDATION_FIELDS.to_vec();
    required.extend(["evidenceBase", "actionItems", "measurableGoals", "successIndicators"]);

    object(
        vec![
            ("id", string()),
            ("category", string()),
            ("skill", string()),
            ("priority", string()),
            ("targetIssue", string()),
            ("diagnosis", string()),
            ("recommendation", string()),
            ("rationale", string()),
            ("evidenceBase", evidence_base),
            ("actionItems", action_items),
            ("measurableGoals", measurable_goals),
            ("successIndicators", string_array()),
            ("timeframe", string()),
            ("patternContext", pattern_context),
        ],
        &required,
    )
}

/// Build the response schema for `taxonomy`
///
/// [`SchemaValidator`](crate::validation::SchemaValidator) reads its
/// required fields from this same document.
pub fn response_schema(taxonomy: &SkillTaxonomy) -> Value {
    let skill_keys: Vec<&str> = taxonomy.skill_keys().collect();
    let skill_categories = object(
        skill_keys.iter().map(|key| (*key, skill_category())).collect(),
        &skill_keys,
    );

    let key_strength = object(
        vec![
            ("strengthName", string()),
            ("type", string()),
            ("evidence", string_array()),
            ("howToLeverage", string()),
        ],
        &["strengthName", "type", "evidence", "howToLeverage"],
    );
    let repeated_issue = object(
        vec![
            ("issue", string()),
            ("rootCause", string()),
            ("frequency", integer()),
            ("severity", string()),
            ("symptoms", string_array()),
        ],
        &["issue", "rootCause", "frequency", "severity", "symptoms"],
    );
    let recent_concern = object(
        vec![
            ("concern", string()),
            ("urgency", string()),
            ("rootCause", string()),
        ],
        &["concern", "urgency"],
    );

    object(
        vec![
            ("subjectName", string()),
            ("totalSessions", integer()),
            ("timeSpan", string()),
            ("keyStrengths", array_of(key_strength)),
            ("skillCategories", skill_categories),
            (
                "patternAnalysis",
                object(
                    vec![
                        ("repeatedIssues", array_of(repeated_issue)),
                        ("recentConcerns", array_of(recent_concern)),
                    ],
                    &["repeatedIssues", "recentConcerns"],
                ),
            ),
            (
                "overallProgression",
                object(
                    vec![
                        ("trend", string()),
                        ("consistency", string()),
                        ("breakthroughMoments", string_array()),
                    ],
                    &["trend", "consistency", "breakthroughMoments"],
                ),
            ),
            ("recommendations", array_of(recommendation())),
        ],
        REQUIRED_TOP_LEVEL,
    )
}
