//! Skill categories and rubric labels the analysis is organised around.
//!
//! The taxonomy is configuration: prompts, the response schema and the
//! validator are all generated from it.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// One named skill category expected in the structured result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDefinition {
    /// JSON key, e.g. "deliverySkills"
    pub key: String,
    /// Human-readable label used in prompts
    pub label: String,
    /// Rubric labels this skill relates to
    pub related_rubrics: Vec<String>,
}

/// One numeric rubric that records may be scored against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RubricDefinition {
    /// Score key on a record, e.g. "rubric_3"
    pub key: String,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillTaxonomy {
    pub skills: Vec<SkillDefinition>,
    pub rubrics: Vec<RubricDefinition>,
    /// Highest rubric score
    pub max_score: u8,
}

fn skill(key: &str, label: &str, related: &[&str]) -> SkillDefinition {
    SkillDefinition {
        key: key.to_string(),
        label: label.to_string(),
        related_rubrics: related.iter().map(|r| r.to_string()).collect(),
    }
}

fn rubric(n: u8, label: &str, description: &str) -> RubricDefinition {
    RubricDefinition {
        key: format!("rubric_{}", n),
        label: label.to_string(),
        description: description.to_string(),
    }
}

impl Default for SkillTaxonomy {
    /// Seven speaking skills and eight classroom rubrics
    fn default() -> Self {
        Self {
            skills: vec![
                skill("speechTimeAndHook", "Speech Time & Hook Quality", &["Duration Management"]),
                skill("deliverySkills", "Delivery Skills", &["Style/Persuasion"]),
                skill(
                    "argumentStructureAndDepth",
                    "Argument Structure & Depth",
                    &["Argument Completeness", "Theory Application"],
                ),
                skill("rebuttalAndDirectness", "Rebuttal & Directness", &["Rebuttal Effectiveness"]),
                skill("examplesAndIllustrations", "Examples & Illustrations", &["Argument Completeness"]),
                skill("engagementAndPOIs", "Engagement & POIs", &["Point of Information"]),
                skill("speechStructureAndOrganization", "Speech Structure & Organization", &[]),
            ],
            rubrics: vec![
                rubric(1, "Duration Management", "Spoke for the full allotted time"),
                rubric(2, "Point of Information", "Offered or accepted a point of information relevant to the topic"),
                rubric(3, "Style/Persuasion", "Volume, pace, tone, diction and flow were persuasive"),
                rubric(4, "Argument Completeness", "Claims carried evidence or warrants, impacts and synthesis"),
                rubric(5, "Theory Application", "Applied theory taught in class"),
                rubric(6, "Rebuttal Effectiveness", "Rebuttal responded directly to the opponent's arguments"),
                rubric(7, "Teammate Support", "Supported the teammate's case and arguments"),
                rubric(8, "Feedback Application", "Applied feedback from previous sessions"),
            ],
            max_score: 5,
        }
    }
}

impl SkillTaxonomy {
    pub fn skill_keys(&self) -> impl Iterator<Item = &str> {
        self.skills.iter().map(|s| s.key.as_str())
    }

    pub fn rubric(&self, key: &str) -> Option<&RubricDefinition> {
        self.rubrics.iter().find(|r| r.key == key)
    }

    /// Render a record's scores in taxonomy order, unknown keys last.
    ///
    /// A score of 0 means the rubric did not apply and renders as "N/A".
    pub fn format_rubric_scores(&self, scores: &BTreeMap<String, u8>) -> String {
        if scores.is_empty() {
            return "No rubric scores available".to_string();
        }

        let render = |score: u8| {
            if score == 0 {
                "N/A".to_string()
            } else {
                format!("{}/{}", score, self.max_score)
            }
        };

        let mut lines = Vec::with_capacity(scores.len());
        for rubric in &self.rubrics {
            if let Some(score) = scores.get(&rubric.key) {
                lines.push(format!(
                    "- **{}**: {} - {}",
                    rubric.label,
                    render(*score),
                    rubric.description
                ));
            }
        }
        for (key, score) in scores {
            if self.rubric(key).is_none() {
                lines.push(format!("- {}: {}", key, render(*score)));
            }
        }
        lines.join("\n")
    }

    /// Numbered rubric list for prompt preambles
    pub fn describe_rubrics(&self) -> String {
        let mut out = String::new();
        for (i, rubric) in self.rubrics.iter().enumerate() {
            let _ = writeln!(out, "{}. **{}**: {}", i + 1, rubric.label, rubric.description);
        }
        out
    }

    /// Bulleted skill list for prompt preambles
    pub fn describe_skills(&self) -> String {
        let mut out = String::new();
        for skill in &self.skills {
            if skill.related_rubrics.is_empty() {
                let _ = writeln!(out, "- **{}** (overall performance)", skill.label);
            } else {
                let _ = writeln!(
                    out,
                    "- **{}** (relates to {})",
                    skill.label,
                    skill.related_rubrics.join(" & ")
                );
            }
        }
        out
    }
}
