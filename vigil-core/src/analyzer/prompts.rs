//! Tiered prompt templates
//!
//! The analyzer picks the richest template the available signals support.
//! Selection priority (first match wins):
//! model zoo > vision enhanced > full enriched > enriched > basic.

use crate::context::{
    format_baseline_comparison, format_cross_camera_summary, format_zone_analysis, EnrichedContext,
};
use crate::enrichment::EnrichmentResult;

/// Which template produced a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    Basic,
    Enriched,
    FullEnriched,
    VisionEnhanced,
    ModelZoo,
}

impl PromptTemplate {
    /// Name recorded in metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTemplate::Basic => "basic",
            PromptTemplate::Enriched => "enriched",
            PromptTemplate::FullEnriched => "full_enriched",
            PromptTemplate::VisionEnhanced => "vision",
            PromptTemplate::ModelZoo => "model_zoo",
        }
    }
}

/// Inputs to prompt construction; context and enrichment are optional
#[derive(Debug, Clone, Copy)]
pub struct PromptInputs<'a> {
    pub camera_name: &'a str,
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub detections_list: &'a str,
    pub enriched_context: Option<&'a EnrichedContext>,
    pub enrichment_result: Option<&'a EnrichmentResult>,
}

const RESPONSE_CONTRACT: &str = r#"Respond with a single JSON object and nothing else:
{"risk_score": <integer 0-100>, "risk_level": "<low|medium|high|critical>", "summary": "<one sentence>", "reasoning": "<short explanation>"}"#;

/// Pick the richest template the available signals support
pub fn select_template(
    enriched_context: Option<&EnrichedContext>,
    enrichment_result: Option<&EnrichmentResult>,
) -> PromptTemplate {
    let has_enriched_context =
        enriched_context.is_some_and(|context| context.baselines.is_some());
    let has_vision = enrichment_result.is_some_and(EnrichmentResult::has_vision_extraction);
    let has_model_zoo = enrichment_result.is_some_and(EnrichmentResult::has_model_zoo);
    let has_enrichment = enrichment_result.is_some_and(EnrichmentResult::has_data);

    if has_model_zoo && has_enriched_context {
        PromptTemplate::ModelZoo
    } else if has_vision && has_enriched_context {
        PromptTemplate::VisionEnhanced
    } else if has_enriched_context && has_enrichment {
        PromptTemplate::FullEnriched
    } else if has_enriched_context {
        PromptTemplate::Enriched
    } else {
        PromptTemplate::Basic
    }
}

/// Build the analysis prompt; returns the text and the template used
pub fn build_prompt(inputs: PromptInputs<'_>) -> (String, PromptTemplate) {
    let template = select_template(inputs.enriched_context, inputs.enrichment_result);
    let prompt = match (template, inputs.enriched_context, inputs.enrichment_result) {
        (PromptTemplate::Enriched, Some(context), _) => enriched_prompt(&inputs, context),
        (PromptTemplate::FullEnriched, Some(context), Some(enrichment)) => {
            full_enriched_prompt(&inputs, context, enrichment)
        }
        (PromptTemplate::VisionEnhanced, Some(context), Some(enrichment)) => {
            vision_prompt(&inputs, context, enrichment)
        }
        (PromptTemplate::ModelZoo, Some(context), Some(enrichment)) => {
            model_zoo_prompt(&inputs, context, enrichment)
        }
        _ => basic_prompt(&inputs),
    };
    (prompt, template)
}

fn basic_prompt(inputs: &PromptInputs<'_>) -> String {
    format!(
        "You are a home security analyst. Assess the risk of the following activity.\n\n\
         Camera: {camera}\n\
         Time window: {start} to {end}\n\
         Detections:\n{detections}\n\n\
         {contract}",
        camera = inputs.camera_name,
        start = inputs.start_time,
        end = inputs.end_time,
        detections = inputs.detections_list,
        contract = RESPONSE_CONTRACT,
    )
}

fn context_sections(context: &EnrichedContext) -> (String, String, String, String, String) {
    let baselines = context.baselines.as_ref();
    (
        format_zone_analysis(&context.zones),
        format_baseline_comparison(baselines),
        baselines
            .map(|b| format!("{:.2}", b.deviation_score))
            .unwrap_or_else(|| "0.00".to_string()),
        format_cross_camera_summary(&context.cross_camera),
        baselines
            .map(|b| b.day_of_week.clone())
            .unwrap_or_else(|| "unknown".to_string()),
    )
}

fn enriched_prompt(inputs: &PromptInputs<'_>, context: &EnrichedContext) -> String {
    let (zones, baseline, deviation, cross_camera, day) = context_sections(context);
    format!(
        "You are a home security analyst. Assess the risk of the following activity using the \
         property context below.\n\n\
         Camera: {camera}\n\
         Time window: {start} to {end} ({day})\n\
         Detections:\n{detections}\n\n\
         Zone analysis:\n{zones}\n\n\
         Baseline comparison (deviation {deviation}):\n{baseline}\n\n\
         Other cameras:\n{cross_camera}\n\n\
         {contract}",
        camera = inputs.camera_name,
        start = inputs.start_time,
        end = inputs.end_time,
        detections = inputs.detections_list,
        contract = RESPONSE_CONTRACT,
    )
}

fn full_enriched_prompt(
    inputs: &PromptInputs<'_>,
    context: &EnrichedContext,
    enrichment: &EnrichmentResult,
) -> String {
    let (zones, baseline, deviation, cross_camera, day) = context_sections(context);
    format!(
        "You are a home security analyst. Assess the risk of the following activity using the \
         property context and vision model output below.\n\n\
         Camera: {camera}\n\
         Time window: {start} to {end} ({day})\n\
         Detections:\n{detections}\n\n\
         Zone analysis:\n{zones}\n\n\
         Baseline comparison (deviation {deviation}):\n{baseline}\n\n\
         Other cameras:\n{cross_camera}\n\n\
         Enrichment signals:\n{enrichment}\n\n\
         {contract}",
        camera = inputs.camera_name,
        start = inputs.start_time,
        end = inputs.end_time,
        detections = inputs.detections_list,
        enrichment = enrichment.to_context_string(),
        contract = RESPONSE_CONTRACT,
    )
}

fn vision_prompt(
    inputs: &PromptInputs<'_>,
    context: &EnrichedContext,
    enrichment: &EnrichmentResult,
) -> String {
    let (zones, baseline, deviation, cross_camera, day) = context_sections(context);

    let vision = enrichment.vision_extraction.as_ref();
    let time_of_day = vision
        .and_then(|v| v.environment_context.as_ref())
        .map(|e| e.time_of_day.clone())
        .unwrap_or_else(|| "day".to_string());
    let scene = vision
        .and_then(|v| v.scene_analysis.clone())
        .unwrap_or_else(|| "No scene analysis available.".to_string());

    format!(
        "You are a home security analyst. Assess the risk of the following activity using the \
         property context, scene analysis, and re-identification matches below.\n\n\
         Camera: {camera}\n\
         Time window: {start} to {end} ({day}, {time_of_day})\n\
         Detections with attributes:\n{detections}\n\n\
         Scene analysis:\n{scene}\n\n\
         Re-identification:\n{reid}\n\n\
         Zone analysis:\n{zones}\n\n\
         Baseline comparison (deviation {deviation}):\n{baseline}\n\n\
         Other cameras:\n{cross_camera}\n\n\
         {contract}",
        camera = inputs.camera_name,
        start = inputs.start_time,
        end = inputs.end_time,
        detections = enrichment.to_context_string(),
        reid = format_reid_context(enrichment),
        contract = RESPONSE_CONTRACT,
    )
}

fn model_zoo_prompt(
    inputs: &PromptInputs<'_>,
    context: &EnrichedContext,
    enrichment: &EnrichmentResult,
) -> String {
    let (zones, baseline, deviation, cross_camera, day) = context_sections(context);

    let time_of_day = enrichment
        .vision_extraction
        .as_ref()
        .and_then(|v| v.environment_context.as_ref())
        .map(|e| e.time_of_day.clone())
        .unwrap_or_else(|| "day".to_string());
    let scene = enrichment
        .vision_extraction
        .as_ref()
        .and_then(|v| v.scene_analysis.clone())
        .unwrap_or_else(|| "No scene analysis available.".to_string());

    format!(
        "You are a home security analyst. Assess the risk of the following activity using the \
         full model-zoo signal set below: pose, threat, demographics, action, and \
         re-identification.\n\n\
         Camera: {camera}\n\
         Time window: {start} to {end} ({day}, {time_of_day})\n\
         Detections with attributes:\n{detections}\n\n\
         Scene analysis:\n{scene}\n\n\
         Re-identification:\n{reid}\n\n\
         Zone analysis:\n{zones}\n\n\
         Baseline comparison (deviation {deviation}):\n{baseline}\n\n\
         Other cameras:\n{cross_camera}\n\n\
         {contract}",
        camera = inputs.camera_name,
        start = inputs.start_time,
        end = inputs.end_time,
        detections = enrichment.to_context_string(),
        reid = format_reid_context(enrichment),
        contract = RESPONSE_CONTRACT,
    )
}

fn format_reid_context(enrichment: &EnrichmentResult) -> String {
    let mut lines = Vec::new();
    for m in &enrichment.person_reid_matches {
        lines.push(format!(
            "- person {} (similarity {:.2}, last seen on {})",
            m.entity_id, m.similarity, m.last_seen_camera_id
        ));
    }
    for m in &enrichment.vehicle_reid_matches {
        lines.push(format!(
            "- vehicle {} (similarity {:.2}, last seen on {})",
            m.entity_id, m.similarity, m.last_seen_camera_id
        ));
    }
    if lines.is_empty() {
        "No re-identification matches.".to_string()
    } else {
        lines.join("\n")
    }
}

/// Rough token estimate used for prompt budget checks (≈4 chars/token)
fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Truncate a prompt so prompt + response fit the model's context window
pub fn validate_and_truncate(prompt: String, context_window: usize, max_output_tokens: usize) -> String {
    let budget_tokens = context_window.saturating_sub(max_output_tokens);
    if estimate_tokens(&prompt) <= budget_tokens {
        return prompt;
    }
    let budget_chars = budget_tokens.saturating_mul(4);
    tracing::warn!(
        prompt_tokens = estimate_tokens(&prompt),
        budget_tokens,
        "prompt exceeds context budget, truncating"
    );
    prompt.chars().take(budget_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BaselineContext;
    use crate::enrichment::{ModelZooSignals, VisionExtraction};
    use std::collections::HashMap;

    fn context_with_baseline() -> EnrichedContext {
        EnrichedContext {
            camera_id: "front_door".into(),
            camera_name: "Front Door".into(),
            baselines: Some(BaselineContext {
                hour_of_day: 14,
                day_of_week: "Monday".into(),
                expected_detections: HashMap::new(),
                current_detections: HashMap::new(),
                deviation_score: 0.0,
                is_anomalous: false,
            }),
            ..Default::default()
        }
    }

    fn inputs<'a>(
        context: Option<&'a EnrichedContext>,
        enrichment: Option<&'a EnrichmentResult>,
    ) -> PromptInputs<'a> {
        PromptInputs {
            camera_name: "Front Door",
            start_time: "2026-08-01T14:00:00Z",
            end_time: "2026-08-01T14:01:30Z",
            detections_list: "  1. 14:00:01 - person (confidence: 0.95)",
            enriched_context: context,
            enrichment_result: enrichment,
        }
    }

    #[test]
    fn no_signals_selects_basic() {
        assert_eq!(select_template(None, None), PromptTemplate::Basic);
    }

    #[test]
    fn context_without_baselines_selects_basic() {
        let context = EnrichedContext::default();
        assert_eq!(select_template(Some(&context), None), PromptTemplate::Basic);
    }

    #[test]
    fn context_alone_selects_enriched() {
        let context = context_with_baseline();
        assert_eq!(
            select_template(Some(&context), None),
            PromptTemplate::Enriched
        );
    }

    #[test]
    fn enrichment_data_upgrades_to_full_enriched() {
        let context = context_with_baseline();
        let enrichment = EnrichmentResult {
            per_detection: HashMap::from([(1, crate::enrichment::EnrichmentData::default())]),
            ..Default::default()
        };
        assert_eq!(
            select_template(Some(&context), Some(&enrichment)),
            PromptTemplate::FullEnriched
        );
    }

    #[test]
    fn vision_beats_full_enriched() {
        let context = context_with_baseline();
        let enrichment = EnrichmentResult {
            vision_extraction: Some(VisionExtraction::default()),
            ..Default::default()
        };
        assert_eq!(
            select_template(Some(&context), Some(&enrichment)),
            PromptTemplate::VisionEnhanced
        );
    }

    #[test]
    fn model_zoo_beats_vision() {
        let context = context_with_baseline();
        let enrichment = EnrichmentResult {
            vision_extraction: Some(VisionExtraction::default()),
            model_zoo: ModelZooSignals {
                threat_summaries: vec!["knife near porch".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            select_template(Some(&context), Some(&enrichment)),
            PromptTemplate::ModelZoo
        );
    }

    #[test]
    fn model_zoo_without_context_falls_back_to_basic() {
        let enrichment = EnrichmentResult {
            model_zoo: ModelZooSignals {
                pose_summaries: vec!["crouching".into()],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            select_template(None, Some(&enrichment)),
            PromptTemplate::Basic
        );
    }

    #[test]
    fn built_prompt_contains_response_contract() {
        let (prompt, template) = build_prompt(inputs(None, None));
        assert_eq!(template, PromptTemplate::Basic);
        assert!(prompt.contains("risk_score"));
        assert!(prompt.contains("Front Door"));
    }

    #[test]
    fn oversized_prompt_is_truncated() {
        let prompt = "x".repeat(100_000);
        let truncated = validate_and_truncate(prompt, 8192, 1536);
        assert!(truncated.len() <= (8192 - 1536) * 4);
    }

    #[test]
    fn prompt_within_budget_is_untouched() {
        let prompt = "short prompt".to_string();
        assert_eq!(
            validate_and_truncate(prompt.clone(), 8192, 1536),
            prompt
        );
    }
}
