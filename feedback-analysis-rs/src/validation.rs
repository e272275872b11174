// feedback-analysis-rs/src/validation.rs
// Structural checks on the stage-two JSON document

use serde_json::{Map, Value};

use crate::schema::response_schema;
use crate::taxonomy::SkillTaxonomy;

/// Every problem found in one document, in discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }

    fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Checks a document against the response schema sent to the generator
///
/// Required fields are read from the schema itself, at every depth. The
/// check is exhaustive: it does not stop at the first problem, so a
/// single failed attempt logs everything the generator got wrong.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    skill_keys: Vec<String>,
    schema: Value,
}

impl SchemaValidator {
    pub fn new(taxonomy: &SkillTaxonomy) -> Self {
        Self {
            skill_keys: taxonomy.skill_keys().map(str::to_string).collect(),
            schema: response_schema(taxonomy),
        }
    }

    pub fn validate(&self, document: &Value) -> ValidationReport {
        let mut report = ValidationReport::default();

        let Some(root) = document.as_object() else {
            report.push("Response is not a JSON object");
            return report;
        };

        for field in required(&self.schema) {
            if is_missing(root.get(field)) {
                report.push(format!("Missing {}", field));
            }
        }

        let properties = &self.schema["properties"];
        if let Some(strengths) = expect_array(root, "keyStrengths", &mut report) {
            for (i, strength) in strengths.iter().enumerate() {
                let context = format!("key strength {}", i);
                check_entry(strength, &properties["keyStrengths"]["items"], &context, &mut report);
            }
        }
        if let Some(categories) = expect_object(root, "skillCategories", &mut report) {
            self.check_skill_categories(categories, &properties["skillCategories"], &mut report);
        }
        for section in ["patternAnalysis", "overallProgression"] {
            if let Some(map) = expect_object(root, section, &mut report) {
                check_fields(map, &properties[section], section, &mut report);
            }
        }
        if let Some(recommendations) = expect_array(root, "recommendations", &mut report) {
            for (i, rec) in recommendations.iter().enumerate() {
                let context = format!("recommendation {}", i);
                check_entry(rec, &properties["recommendations"]["items"], &context, &mut report);
            }
        }

        report
    }

    fn check_skill_categories(
        &self,
        categories: &Map<String, Value>,
        schema: &Value,
        report: &mut ValidationReport,
    ) {
        for key in &self.skill_keys {
            let Some(category) = categories.get(key).filter(|v| !v.is_null()) else {
                report.push(format!("Missing skill category: {}", key));
                continue;
            };
            let context = format!("skill category {}", key);
            check_entry(category, &schema["properties"][key.as_str()], &context, report);
        }

        for key in categories.keys() {
            if !self.skill_keys.iter().any(|k| k == key) {
                report.push(format!("Unexpected skill category: {}", key));
            }
        }
    }
}

fn required(schema: &Value) -> impl Iterator<Item = &str> {
    schema["required"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn check_entry(value: &Value, schema: &Value, context: &str, report: &mut ValidationReport) {
    match value.as_object() {
        Some(map) => check_fields(map, schema, context, report),
        None => report.push(format!("Invalid {}", context)),
    }
}

/// Check every field `schema` requires of `map`, descending into nested
/// objects and arrays of objects
fn check_fields(map: &Map<String, Value>, schema: &Value, context: &str, report: &mut ValidationReport) {
    for field in required(schema) {
        let property = &schema["properties"][field];
        let value = map.get(field);

        match property["type"].as_str() {
            Some("STRING") => {
                if !has_text(value) {
                    report.push(format!("Missing {} for {}", field, context));
                }
            }
            Some(kind @ ("INTEGER" | "NUMBER")) => {
                let valid = if kind == "INTEGER" { is_count(value) } else { is_number(value) };
                if is_missing(value) {
                    report.push(format!("Missing {} for {}", field, context));
                } else if !valid {
                    report.push(format!("Invalid {} for {}: expected number", field, context));
                }
            }
            Some("ARRAY") => match value {
                None | Some(Value::Null) => report.push(format!("Missing {} for {}", field, context)),
                Some(Value::Array(items)) => {
                    let item_schema = &property["items"];
                    if item_schema["type"] == "OBJECT" {
                        for (i, item) in items.iter().enumerate() {
                            let entry = format!("{} entry {} of {}", field, i, context);
                            check_entry(item, item_schema, &entry, report);
                        }
                    }
                }
                Some(_) => report.push(format!("Invalid {} array for {}", field, context)),
            },
            Some("OBJECT") => match value {
                None | Some(Value::Null) => report.push(format!("Missing {} for {}", field, context)),
                Some(Value::Object(inner)) => {
                    check_fields(inner, property, &format!("{} in {}", field, context), report)
                }
                Some(_) => report.push(format!("Invalid {} for {}: expected object", field, context)),
            },
            _ => {
                if is_missing(value) {
                    report.push(format!("Missing {} for {}", field, context));
                }
            }
        }
    }
}

fn expect_array<'a>(root: &'a Map<String, Value>, field: &str, report: &mut ValidationReport) -> Option<&'a Vec<Value>> {
    match root.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(items),
        Some(_) => {
            report.push(format!("Invalid {}: expected array", field));
            None
        }
    }
}

fn expect_object<'a>(
    root: &'a Map<String, Value>,
    field: &str,
    report: &mut ValidationReport,
) -> Option<&'a Map<String, Value>> {
    match root.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            report.push(format!("Invalid {}: expected object", field));
            None
        }
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

// Numbers count as text; the typed model stringifies them.
fn has_text(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(_)) => true,
        _ => false,
    }
}

fn is_count(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(n)) => n.as_u64().is_some() || n.as_f64().map_or(false, |f| f >= 0.0),
        Some(Value::String(s)) => s.trim().parse::<u32>().is_ok(),
        _ => false,
    }
}

fn is_number(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Number(_)) => true,
        Some(Value::String(s)) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}
