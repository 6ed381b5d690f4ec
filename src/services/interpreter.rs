use serde_json::{Map, Value};

use super::ai_service::RawResponse;
use crate::error::AnalysisError;
use crate::models::{FoodAnalysisResult, FoodStatus};

pub const FALLBACK_RECOMMENDATION: &str =
    "Unable to give a confident recommendation. When in doubt, throw it out.";

const SCORE_MIN: f64 = 0.0;
const SCORE_MAX: f64 = 100.0;

/// Turn a raw service reply into a validated result.
///
/// Only fails when the reply is not a JSON object. Anything else is coerced:
/// unknown statuses become `Unknown`, scores are clamped to 0..=100 (0 when
/// missing or unparsable), missing lists become empty and a missing
/// recommendation gets a generic fallback.
pub fn parse(raw: &RawResponse) -> Result<FoodAnalysisResult, AnalysisError> {
    let object = raw.as_object().ok_or_else(|| {
        AnalysisError::MalformedResponse(format!("expected a JSON object, got {}", kind_of(raw)))
    })?;

    let status = match field(object, &["status"]) {
        Some(Value::String(s)) => FoodStatus::from_string(s),
        Some(other) => {
            log::warn!("⚠️ Non-string status {:?}, using Unknown", other);
            FoodStatus::Unknown
        }
        None => FoodStatus::Unknown,
    };

    let safety_score = score(field(object, &["safetyScore", "safety_score"]), false);
    let confidence = score(field(object, &["confidence"]), true);

    let recommendation = match field(object, &["recommendation"]) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => FALLBACK_RECOMMENDATION.to_string(),
    };

    Ok(FoodAnalysisResult {
        status,
        safety_score,
        confidence,
        observations: string_list(field(object, &["observations"])),
        recommendation,
        spoilage_signs: string_list(field(object, &["spoilageSigns", "spoilage_signs"])),
    })
}

fn field<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| object.get(*k))
        .find(|v| !v.is_null())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Numbers or numeric strings ("88", "88%"). With `fraction_scale`, values in
/// 0..=1 are read as fractions and scaled up to percent.
fn score(value: Option<&Value>, fraction_scale: bool) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    let Some(mut v) = parsed.filter(|v| v.is_finite()) else {
        return SCORE_MIN;
    };

    if fraction_scale && (0.0..=1.0).contains(&v) {
        v *= 100.0;
    }

    v.clamp(SCORE_MIN, SCORE_MAX)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
