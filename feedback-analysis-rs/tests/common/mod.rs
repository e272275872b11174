// Shared fixtures for the pipeline scenarios

#![allow(dead_code)]

use chrono::NaiveDate;
use feedback_analysis::{FeedbackRecord, SkillTaxonomy};
use serde_json::{json, Map, Value};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid test date")
}

/// Five sessions spread over three months, deliberately out of order
pub fn five_sessions() -> Vec<FeedbackRecord> {
    vec![
        FeedbackRecord::new("3.2", date("2024-03-14"), "Full-length speech with a strong close.")
            .with_score("rubric_1", 5)
            .with_score("rubric_3", 4),
        FeedbackRecord::new("1.1", date("2024-01-08"), "Nervous opening, finished two minutes early.")
            .with_motion("This house would ban homework")
            .with_score("rubric_1", 2),
        FeedbackRecord::new("2.1", date("2024-02-05"), "Clearer signposting; rebuttal still indirect.")
            .with_improvement_areas("Respond to the opponent's actual claims"),
        FeedbackRecord::new("1.2", date("2024-01-22"), "Better hook, still short on time.")
            .with_best_aspects("Engaging story in the hook"),
        FeedbackRecord::new("2.2", date("2024-02-26"), "Took a POI and answered it well.")
            .with_comments("Keep offering POIs"),
    ]
}

/// A structurally valid analysis with every skill in `taxonomy`
pub fn valid_analysis(taxonomy: &SkillTaxonomy, sessions: u32) -> Value {
    let categories: Map<String, Value> = taxonomy
        .skills
        .iter()
        .map(|skill| {
            (
                skill.key.clone(),
                json!({
                    "name": skill.label,
                    "currentLevel": "Developing",
                    "progress": "improving",
                    "consistency": "medium",
                    "evidence": ["\"Better hook\""],
                    "pattern": "Gradual improvement",
                    "chronologicalTrend": [
                        {"session": 2, "level": "Developing", "date": "2024-01-22", "evidence": "Better hook"},
                        {"session": 1, "level": "Novice", "date": "2024-01-08", "evidence": "Nervous opening"}
                    ]
                }),
            )
        })
        .collect();

    json!({
        "subjectName": "Avery",
        "totalSessions": sessions,
        "keyStrengths": [{
            "strengthName": "Storytelling",
            "type": "emerging",
            "evidence": ["\"Engaging story in the hook\""],
            "howToLeverage": "Open every speech with a story"
        }],
        "skillCategories": categories,
        "patternAnalysis": {
            "repeatedIssues": [{
                "issue": "Short speeches",
                "rootCause": "Thin preparation",
                "frequency": 2,
                "severity": "medium",
                "symptoms": ["Finished early"]
            }],
            "recentConcerns": []
        },
        "overallProgression": {
            "trend": "improving",
            "consistency": "medium",
            "breakthroughMoments": ["First full-length speech in March"]
        },
        "recommendations": [{
            "category": "skill_development",
            "skill": "rebuttalAndDirectness",
            "priority": "high",
            "targetIssue": "Indirect rebuttal",
            "diagnosis": "Rebuts prepared points instead of the opponent's claims",
            "recommendation": "Flow the opponent's speech and answer each claim by name",
            "rationale": "Direct clash is what the rubric rewards",
            "evidenceBase": {
                "sessionCount": 2,
                "patternIdentified": "Indirect rebuttal",
                "supportingQuotes": ["\"rebuttal still indirect\""],
                "timeframeCovered": "February"
            },
            "actionItems": {
                "preparationFocus": ["Flowing practice"],
                "practiceExercises": ["Two-minute rebuttal drills"],
                "nextSessionObjectives": ["Name each opposing claim"]
            },
            "measurableGoals": {
                "shortTerm": ["Answer two claims directly"],
                "mediumTerm": ["Answer every claim"],
                "longTerm": ["Lead with rebuttal"]
            },
            "successIndicators": ["Judges note direct clash"],
            "timeframe": "4 weeks"
        }]
    })
}
