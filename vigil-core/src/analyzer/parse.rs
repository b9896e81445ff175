//! LLM completion parsing
//!
//! Nemotron-style models emit `<think>…</think>` reasoning blocks before the
//! JSON payload, sometimes leave the tag unclosed, and sometimes "think out
//! loud" in plain prose before the first `{`. The extractor strips all of
//! that, then scans for the first balanced JSON object that carries both
//! `risk_score` and `risk_level`.

use crate::{Error, Result};
use serde_json::Value;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Remove `<think>…</think>` blocks, tolerating an unclosed final tag
fn strip_think_blocks(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find(THINK_OPEN) {
            None => {
                cleaned.push_str(rest);
                break;
            }
            Some(open) => {
                cleaned.push_str(&rest[..open]);
                let after_open = &rest[open + THINK_OPEN.len()..];
                match after_open.find(THINK_CLOSE) {
                    Some(close) => {
                        rest = &after_open[close + THINK_CLOSE.len()..];
                    }
                    None => {
                        // Unclosed block: keep anything from the first `{`
                        // onward, the model usually appends the JSON without
                        // ever closing the tag
                        if let Some(brace) = after_open.find('{') {
                            cleaned.push_str(&after_open[brace..]);
                        }
                        break;
                    }
                }
            }
        }
    }
    cleaned.trim().to_string()
}

/// Yield every balanced top-level JSON object candidate in `text`
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut candidates = Vec::new();
    let mut start: Option<usize> = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            candidates.push(&text[s..=i]);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    candidates
}

/// Extract the risk assessment object from an LLM completion
///
/// Returns the first balanced JSON object containing both `risk_score` and
/// `risk_level`. Fails only when no such object exists anywhere in the
/// completion.
pub fn extract_risk_object(text: &str) -> Result<Value> {
    let cleaned = strip_think_blocks(text);

    // Skip prose preamble before the first brace
    let scan_target = match cleaned.find('{') {
        Some(pos) if pos > 0 => &cleaned[pos..],
        _ => cleaned.as_str(),
    };

    for source in [scan_target, text] {
        for candidate in balanced_objects(source) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                if value.get("risk_score").is_some() && value.get("risk_level").is_some() {
                    return Ok(value);
                }
            }
        }
    }

    let preview: String = text.chars().take(200).collect();
    Err(Error::Parse(format!(
        "no risk JSON found in LLM response: {preview}"
    )))
}
