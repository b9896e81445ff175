//! Risk data validation
//!
//! Two-pass decoding: a strict pass accepts well-formed LLM output
//! directly; the lenient pass clamps out-of-range scores, coerces numeric
//! strings, infers missing or invalid levels from the score, and fills
//! default summary/reasoning text.

use crate::models::risk::{clamp_risk_score, RiskLevel, SeverityThresholds};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default summary when the LLM omits one
pub const DEFAULT_SUMMARY: &str = "Risk analysis completed";
/// Default reasoning when the LLM omits one
pub const DEFAULT_REASONING: &str = "No detailed reasoning provided";

/// A validated, normalized risk assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub summary: String,
    pub reasoning: String,
}

impl RiskAssessment {
    /// Fallback used when the LLM service fails entirely
    pub fn llm_failure_fallback() -> Self {
        Self {
            risk_score: 50,
            risk_level: RiskLevel::Medium,
            summary: "Analysis unavailable - LLM service error".to_string(),
            reasoning: "Failed to analyze detections due to service error".to_string(),
        }
    }

    /// Fallback used when a completion arrived but could not be parsed
    pub fn parse_failure_fallback() -> Self {
        Self {
            risk_score: 50,
            risk_level: RiskLevel::Medium,
            summary: "Analysis unavailable".to_string(),
            reasoning: "Could not parse LLM response".to_string(),
        }
    }
}

/// Strict shape: every field present, score already in range
#[derive(Debug, Deserialize)]
struct StrictRiskResponse {
    risk_score: i64,
    risk_level: String,
    summary: String,
    reasoning: String,
}

fn try_strict(value: &Value) -> Option<RiskAssessment> {
    let strict: StrictRiskResponse = serde_json::from_value(value.clone()).ok()?;
    if !(0..=100).contains(&strict.risk_score) {
        return None;
    }
    let level = RiskLevel::parse(&strict.risk_level)?;
    Some(RiskAssessment {
        risk_score: strict.risk_score as u8,
        risk_level: level,
        summary: strict.summary,
        reasoning: strict.reasoning,
    })
}

fn coerce_score(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Number(n)) => n.as_f64().map(clamp_risk_score).unwrap_or(50),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(clamp_risk_score).unwrap_or(50),
        _ => 50,
    }
}

fn coerce_text(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        _ => default.to_string(),
    }
}

/// Validate and normalize a raw risk object
///
/// Never fails: anything the strict pass rejects is repaired field by
/// field, with the level inferred from the clamped score when absent or
/// invalid.
pub fn validate_risk_data(value: &Value, thresholds: &SeverityThresholds) -> RiskAssessment {
    if let Some(strict) = try_strict(value) {
        return strict;
    }

    let risk_score = coerce_score(value.get("risk_score"));
    let risk_level = value
        .get("risk_level")
        .and_then(Value::as_str)
        .and_then(RiskLevel::parse)
        .unwrap_or_else(|| thresholds.classify(risk_score));

    RiskAssessment {
        risk_score,
        risk_level,
        summary: coerce_text(value.get("summary"), DEFAULT_SUMMARY),
        reasoning: coerce_text(value.get("reasoning"), DEFAULT_REASONING),
    }
}
