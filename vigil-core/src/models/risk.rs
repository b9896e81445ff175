//! Risk scoring domain: levels, thresholds, and classification

use crate::config::Settings;
use serde::{Deserialize, Serialize};

/// Discrete risk level attached to every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Parse a risk level from LLM output, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    /// Canonical lowercase name, as stored and broadcast
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Score boundaries between risk levels
///
/// A score classifies as the first level whose upper bound contains it:
/// `low <= low_max < medium <= medium_max < high <= high_max < critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SeverityThresholds {
    pub low_max: u8,
    pub medium_max: u8,
    pub high_max: u8,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low_max: 29,
            medium_max: 59,
            high_max: 84,
        }
    }
}

impl SeverityThresholds {
    /// Thresholds configured in [`Settings`]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            low_max: settings.severity_low_max,
            medium_max: settings.severity_medium_max,
            high_max: settings.severity_high_max,
        }
    }

    /// Map a risk score onto its level
    pub fn classify(&self, score: u8) -> RiskLevel {
        if score <= self.low_max {
            RiskLevel::Low
        } else if score <= self.medium_max {
            RiskLevel::Medium
        } else if score <= self.high_max {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }
}

/// Clamp an arbitrary numeric score into the valid [0, 100] range
pub fn clamp_risk_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return 50;
    }
    raw.clamp(0.0, 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_respects_boundaries() {
        let t = SeverityThresholds::default();
        assert_eq!(t.classify(0), RiskLevel::Low);
        assert_eq!(t.classify(29), RiskLevel::Low);
        assert_eq!(t.classify(30), RiskLevel::Medium);
        assert_eq!(t.classify(59), RiskLevel::Medium);
        assert_eq!(t.classify(60), RiskLevel::High);
        assert_eq!(t.classify(84), RiskLevel::High);
        assert_eq!(t.classify(85), RiskLevel::Critical);
        assert_eq!(t.classify(100), RiskLevel::Critical);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(RiskLevel::parse("HIGH"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse(" Medium "), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::parse("severe"), None);
    }

    #[test]
    fn clamp_handles_out_of_range_scores() {
        assert_eq!(clamp_risk_score(-10.0), 0);
        assert_eq!(clamp_risk_score(150.0), 100);
        assert_eq!(clamp_risk_score(42.4), 42);
        assert_eq!(clamp_risk_score(f64::NAN), 50);
    }
}
