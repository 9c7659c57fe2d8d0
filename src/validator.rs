//! Schema validation of raw model output.
//!
//! Takes the opaque response payload and either produces a fully-typed
//! candidate record or a structured validation error. Structural acceptance
//! only: content is never semantically corrected here.
//!
//! Numeric range policy: out-of-range `theme_confidence` and `sentiment_score`
//! values are clamped into their declared bounds. The raw payload stays on the
//! attempt record, so the original value remains auditable.

use serde_json::Value;
use thiserror::Error;

use crate::models::{EnthusiasmLevel, ProjectType};

/// Validation errors, split so malformed payloads and shape problems are
/// distinguishable in failure records.
#[derive(Debug, Error)]
pub enum ValidateError {
    /// Payload is not parseable JSON at all.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Valid JSON with the wrong shape.
    #[error("Invalid shape: {0}")]
    Shape(String),

    /// A required field is missing or has the wrong type.
    #[error("Field '{field}': expected {expected}")]
    Field {
        field: &'static str,
        expected: &'static str,
    },
}

/// A structurally validated extraction candidate, not yet gated.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub themes: Vec<String>,
    pub theme_confidence: f64,
    pub project_type: ProjectType,
    pub use_cases: Vec<String>,
    pub target_audience: Vec<String>,
    pub technologies_mentioned: Vec<String>,
    pub sentiment_score: f64,
    pub enthusiasm_level: EnthusiasmLevel,
    pub summary: String,
    pub key_innovation: String,
    pub problem_addressed: String,
    pub solution_approach: String,
    pub has_clear_problem: bool,
    pub has_clear_solution: bool,
    pub has_impact_metrics: bool,
    pub contains_pii: bool,
}

/// Strip a surrounding markdown code fence, which some models emit despite
/// instructions not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

fn required_array_of_strings(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, ValidateError> {
    match obj.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(|s| s.trim().to_string()).ok_or(
                    ValidateError::Field {
                        field,
                        expected: "array of strings",
                    },
                )
            })
            .filter(|entry| !matches!(entry, Ok(s) if s.is_empty()))
            .collect(),
        Some(_) => Err(ValidateError::Field {
            field,
            expected: "array of strings",
        }),
        None => Err(ValidateError::Field {
            field,
            expected: "array of strings",
        }),
    }
}

fn optional_array_of_strings(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Vec<String> {
    match obj.get(field) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn required_number(
    obj: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<f64, ValidateError> {
    obj.get(field)
        .and_then(Value::as_f64)
        .ok_or(ValidateError::Field {
            field,
            expected: "number",
        })
}

fn optional_number(obj: &serde_json::Map<String, Value>, field: &str, default: f64) -> f64 {
    obj.get(field).and_then(Value::as_f64).unwrap_or(default)
}

fn optional_string(obj: &serde_json::Map<String, Value>, field: &str) -> String {
    obj.get(field)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn optional_bool(obj: &serde_json::Map<String, Value>, field: &str) -> bool {
    obj.get(field).and_then(Value::as_bool).unwrap_or(false)
}

/// Parse and validate a raw response payload into a typed candidate.
pub fn parse_candidate(raw: &str) -> Result<Candidate, ValidateError> {
    let stripped = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(stripped).map_err(|e| ValidateError::Malformed(e.to_string()))?;

    let obj = value
        .as_object()
        .ok_or_else(|| ValidateError::Shape("top level is not a JSON object".to_string()))?;

    let themes = required_array_of_strings(obj, "themes")?;
    let theme_confidence = required_number(obj, "theme_confidence")?.clamp(0.0, 1.0);
    let sentiment_score = optional_number(obj, "sentiment_score", 0.0).clamp(-1.0, 1.0);

    Ok(Candidate {
        themes,
        theme_confidence,
        project_type: ProjectType::parse_or_other(&optional_string(obj, "project_type")),
        use_cases: optional_array_of_strings(obj, "use_cases"),
        target_audience: optional_array_of_strings(obj, "target_audience"),
        technologies_mentioned: optional_array_of_strings(obj, "technologies_mentioned"),
        sentiment_score,
        enthusiasm_level: EnthusiasmLevel::parse_or_neutral(&optional_string(
            obj,
            "enthusiasm_level",
        )),
        summary: optional_string(obj, "summary_200"),
        key_innovation: optional_string(obj, "key_innovation"),
        problem_addressed: optional_string(obj, "problem_addressed"),
        solution_approach: optional_string(obj, "solution_approach"),
        has_clear_problem: optional_bool(obj, "has_clear_problem"),
        has_clear_solution: optional_bool(obj, "has_clear_solution"),
        has_impact_metrics: optional_bool(obj, "has_impact_metrics"),
        contains_pii: optional_bool(obj, "contains_pii"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RESPONSE: &str = r#"{
        "themes": ["healthcare_medical", "artificial_intelligence_ml"],
        "theme_confidence": 0.92,
        "project_type": "mobile_app",
        "use_cases": ["detect skin conditions from photos"],
        "target_audience": ["rural clinics"],
        "technologies_mentioned": ["react native", "tensorflow"],
        "sentiment_score": 0.6,
        "enthusiasm_level": "high",
        "summary_200": "Mobile app detecting skin conditions for rural clinics.",
        "key_innovation": "On-device diagnosis",
        "problem_addressed": "Lack of dermatology access",
        "solution_approach": "Photo classification",
        "has_clear_problem": true,
        "has_clear_solution": true,
        "has_impact_metrics": false,
        "contains_pii": false
    }"#;

    #[test]
    fn test_parse_full_response() {
        let candidate = parse_candidate(FULL_RESPONSE).unwrap();
        assert_eq!(
            candidate.themes,
            vec!["healthcare_medical", "artificial_intelligence_ml"]
        );
        assert_eq!(candidate.theme_confidence, 0.92);
        assert_eq!(candidate.project_type, ProjectType::MobileApp);
        assert_eq!(candidate.enthusiasm_level, EnthusiasmLevel::High);
        assert!(candidate.has_clear_problem);
        assert!(!candidate.contains_pii);
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let fenced = format!("```json\n{FULL_RESPONSE}\n```");
        let candidate = parse_candidate(&fenced).unwrap();
        assert_eq!(candidate.theme_confidence, 0.92);
    }

    #[test]
    fn test_malformed_json_is_hard_failure() {
        let err = parse_candidate("the model rambled instead").unwrap_err();
        assert!(matches!(err, ValidateError::Malformed(_)));
    }

    #[test]
    fn test_non_object_is_shape_error() {
        let err = parse_candidate(r#"["just", "an", "array"]"#).unwrap_err();
        assert!(matches!(err, ValidateError::Shape(_)));
    }

    #[test]
    fn test_missing_required_field() {
        let err = parse_candidate(r#"{"theme_confidence": 0.8}"#).unwrap_err();
        assert!(matches!(
            err,
            ValidateError::Field {
                field: "themes",
                ..
            }
        ));
    }

    #[test]
    fn test_wrong_type_for_required_field() {
        let err = parse_candidate(r#"{"themes": "healthcare", "theme_confidence": 0.8}"#)
            .unwrap_err();
        assert!(matches!(err, ValidateError::Field { field: "themes", .. }));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let candidate = parse_candidate(
            r#"{"themes": ["a"], "theme_confidence": 1.4, "sentiment_score": -3.0}"#,
        )
        .unwrap();
        assert_eq!(candidate.theme_confidence, 1.0);
        assert_eq!(candidate.sentiment_score, -1.0);
    }

    #[test]
    fn test_optional_fields_default() {
        let candidate =
            parse_candidate(r#"{"themes": ["a"], "theme_confidence": 0.5}"#).unwrap();
        assert!(candidate.use_cases.is_empty());
        assert_eq!(candidate.project_type, ProjectType::Other);
        assert_eq!(candidate.enthusiasm_level, EnthusiasmLevel::Neutral);
        assert_eq!(candidate.sentiment_score, 0.0);
        assert_eq!(candidate.summary, "");
        assert!(!candidate.has_clear_problem);
    }

    #[test]
    fn test_unknown_project_type_maps_to_other() {
        let candidate = parse_candidate(
            r#"{"themes": ["a"], "theme_confidence": 0.5, "project_type": "quantum_thing"}"#,
        )
        .unwrap();
        assert_eq!(candidate.project_type, ProjectType::Other);
    }
}
