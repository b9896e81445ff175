//! Pipeline configuration
//!
//! A single [`Settings`] struct covers the batching, AI, severity, GPU, and
//! queue knobs. Defaults match production; every field can be overridden
//! from the environment via [`Settings::from_env`].

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime configuration for the pipeline core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Batching
    /// Hard window: a batch closes this many seconds after it started
    pub batch_window_seconds: f64,
    /// Idle window: a batch closes after this many seconds without activity
    pub batch_idle_timeout_seconds: f64,
    /// Minimum confidence for fast-path promotion
    pub fast_path_confidence_threshold: f64,
    /// Object types (lowercase) eligible for fast-path promotion
    pub fast_path_object_types: Vec<String>,

    // AI concurrency
    /// Process-wide cap on concurrent AI inferences
    pub ai_max_concurrent_inferences: usize,
    /// Connect timeout for AI service HTTP calls (seconds)
    pub ai_connect_timeout_seconds: f64,

    // Object detector service
    /// Base URL of the object-detector service
    pub detector_url: String,
    /// Optional static API key sent to the detector
    pub detector_api_key: Option<String>,
    /// Read timeout for detector calls (seconds)
    pub detector_read_timeout_seconds: f64,
    /// Retry budget for detector calls
    pub detector_max_retries: u32,
    /// Detections below this confidence are discarded
    pub detection_confidence_threshold: f64,

    // Nemotron LLM service
    /// Base URL of the LLM completion service
    pub nemotron_url: String,
    /// Optional static API key sent as `X-API-Key`
    pub nemotron_api_key: Option<String>,
    /// Read timeout for LLM calls (seconds)
    pub nemotron_read_timeout_seconds: f64,
    /// Retry budget for LLM calls
    pub nemotron_max_retries: u32,
    /// Context window of the model, in tokens
    pub nemotron_context_window: usize,
    /// Output token cap per completion
    pub nemotron_max_output_tokens: usize,

    // Severity thresholds (risk_score -> risk_level)
    /// Scores at or below this are "low"
    pub severity_low_max: u8,
    /// Scores at or below this are "medium"
    pub severity_medium_max: u8,
    /// Scores at or below this are "high"; above is "critical"
    pub severity_high_max: u8,

    // GPU monitoring
    /// Seconds between GPU stat samples
    pub gpu_poll_interval_seconds: f64,
    /// Minutes of stats history retained in memory
    pub gpu_stats_history_minutes: u32,
    /// VRAM percentage at which memory pressure becomes WARNING
    pub gpu_memory_warning_threshold: f64,
    /// VRAM percentage at which memory pressure becomes CRITICAL
    pub gpu_memory_critical_threshold: f64,

    // Queues
    /// Maximum length of any named queue before the overflow policy applies
    pub max_queue_length: usize,
    /// Retention for dead-letter queue items (seconds)
    pub dlq_retention_seconds: u64,
    /// Per-worker retry cap before an item is routed to the DLQ
    pub worker_max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_window_seconds: 90.0,
            batch_idle_timeout_seconds: 30.0,
            fast_path_confidence_threshold: 0.90,
            fast_path_object_types: vec!["person".to_string()],
            ai_max_concurrent_inferences: 4,
            ai_connect_timeout_seconds: 5.0,
            detector_url: "http://localhost:8190".to_string(),
            detector_api_key: None,
            detector_read_timeout_seconds: 30.0,
            detector_max_retries: 3,
            detection_confidence_threshold: 0.5,
            nemotron_url: "http://localhost:8191".to_string(),
            nemotron_api_key: None,
            nemotron_read_timeout_seconds: 60.0,
            nemotron_max_retries: 2,
            nemotron_context_window: 8192,
            nemotron_max_output_tokens: 1536,
            severity_low_max: 29,
            severity_medium_max: 59,
            severity_high_max: 84,
            gpu_poll_interval_seconds: 5.0,
            gpu_stats_history_minutes: 30,
            gpu_memory_warning_threshold: 85.0,
            gpu_memory_critical_threshold: 95.0,
            max_queue_length: 1000,
            dlq_retention_seconds: 86_400,
            worker_max_retries: 3,
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults
    ///
    /// Variable names are the field names uppercased, e.g.
    /// `BATCH_WINDOW_SECONDS`, `NEMOTRON_URL`, `AI_MAX_CONCURRENT_INFERENCES`.
    /// `FAST_PATH_OBJECT_TYPES` is a comma-separated list.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        read_env("BATCH_WINDOW_SECONDS", &mut settings.batch_window_seconds);
        read_env(
            "BATCH_IDLE_TIMEOUT_SECONDS",
            &mut settings.batch_idle_timeout_seconds,
        );
        read_env(
            "FAST_PATH_CONFIDENCE_THRESHOLD",
            &mut settings.fast_path_confidence_threshold,
        );
        if let Ok(types) = std::env::var("FAST_PATH_OBJECT_TYPES") {
            settings.fast_path_object_types = types
                .split(',')
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect();
        }
        read_env(
            "AI_MAX_CONCURRENT_INFERENCES",
            &mut settings.ai_max_concurrent_inferences,
        );
        read_env(
            "AI_CONNECT_TIMEOUT_SECONDS",
            &mut settings.ai_connect_timeout_seconds,
        );
        if let Ok(url) = std::env::var("DETECTOR_URL") {
            settings.detector_url = url;
        }
        settings.detector_api_key = std::env::var("DETECTOR_API_KEY").ok();
        read_env(
            "DETECTOR_READ_TIMEOUT_SECONDS",
            &mut settings.detector_read_timeout_seconds,
        );
        read_env("DETECTOR_MAX_RETRIES", &mut settings.detector_max_retries);
        read_env(
            "DETECTION_CONFIDENCE_THRESHOLD",
            &mut settings.detection_confidence_threshold,
        );
        if let Ok(url) = std::env::var("NEMOTRON_URL") {
            settings.nemotron_url = url;
        }
        settings.nemotron_api_key = std::env::var("NEMOTRON_API_KEY").ok();
        read_env(
            "NEMOTRON_READ_TIMEOUT_SECONDS",
            &mut settings.nemotron_read_timeout_seconds,
        );
        read_env("NEMOTRON_MAX_RETRIES", &mut settings.nemotron_max_retries);
        read_env(
            "NEMOTRON_CONTEXT_WINDOW",
            &mut settings.nemotron_context_window,
        );
        read_env(
            "NEMOTRON_MAX_OUTPUT_TOKENS",
            &mut settings.nemotron_max_output_tokens,
        );
        read_env("SEVERITY_LOW_MAX", &mut settings.severity_low_max);
        read_env("SEVERITY_MEDIUM_MAX", &mut settings.severity_medium_max);
        read_env("SEVERITY_HIGH_MAX", &mut settings.severity_high_max);
        read_env(
            "GPU_POLL_INTERVAL_SECONDS",
            &mut settings.gpu_poll_interval_seconds,
        );
        read_env(
            "GPU_STATS_HISTORY_MINUTES",
            &mut settings.gpu_stats_history_minutes,
        );
        read_env("MAX_QUEUE_LENGTH", &mut settings.max_queue_length);
        read_env("DLQ_RETENTION_SECONDS", &mut settings.dlq_retention_seconds);
        read_env("WORKER_MAX_RETRIES", &mut settings.worker_max_retries);

        settings
    }

    /// Connect timeout as a [`Duration`]
    pub fn ai_connect_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ai_connect_timeout_seconds)
    }

    /// Detector read timeout as a [`Duration`]
    pub fn detector_read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.detector_read_timeout_seconds)
    }

    /// LLM read timeout as a [`Duration`]
    pub fn nemotron_read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.nemotron_read_timeout_seconds)
    }
}

fn read_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        if let Ok(value) = raw.parse() {
            *target = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_overrides_apply() {
        std::env::set_var("BATCH_WINDOW_SECONDS", "120");
        std::env::set_var("FAST_PATH_OBJECT_TYPES", "Person, Car");
        std::env::set_var("NEMOTRON_URL", "http://llm.internal:8191");
        let settings = Settings::from_env();
        std::env::remove_var("BATCH_WINDOW_SECONDS");
        std::env::remove_var("FAST_PATH_OBJECT_TYPES");
        std::env::remove_var("NEMOTRON_URL");

        assert_eq!(settings.batch_window_seconds, 120.0);
        assert_eq!(
            settings.fast_path_object_types,
            vec!["person".to_string(), "car".to_string()]
        );
        assert_eq!(settings.nemotron_url, "http://llm.internal:8191");
    }

    #[test]
    #[serial]
    fn unparsable_env_values_keep_defaults() {
        std::env::set_var("AI_MAX_CONCURRENT_INFERENCES", "not a number");
        let settings = Settings::from_env();
        std::env::remove_var("AI_MAX_CONCURRENT_INFERENCES");
        assert_eq!(settings.ai_max_concurrent_inferences, 4);
    }

    #[test]
    fn defaults_match_production_values() {
        let s = Settings::default();
        assert_eq!(s.batch_window_seconds, 90.0);
        assert_eq!(s.batch_idle_timeout_seconds, 30.0);
        assert_eq!(s.fast_path_confidence_threshold, 0.90);
        assert_eq!(s.fast_path_object_types, vec!["person".to_string()]);
        assert_eq!(s.ai_max_concurrent_inferences, 4);
        assert_eq!(s.severity_low_max, 29);
        assert_eq!(s.severity_medium_max, 59);
        assert_eq!(s.severity_high_max, 84);
        assert_eq!(s.gpu_memory_warning_threshold, 85.0);
        assert_eq!(s.gpu_memory_critical_threshold, 95.0);
    }
}
