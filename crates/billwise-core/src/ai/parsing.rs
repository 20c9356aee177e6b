//! Parsing helpers for service responses
//!
//! Models often wrap the payload in extra text, code fences or hidden
//! reasoning blocks. These functions dig out the part we need.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ServiceError;

use super::types::Suggestion;

fn think_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"))
}

/// Remove `<think>...</think>` blocks emitted by reasoning models
///
/// A dangling close tag (opening tag swallowed by the server) drops
/// everything before it.
pub fn strip_think(text: &str) -> String {
    let stripped = think_block().replace_all(text, "").into_owned();
    let visible = match stripped.rfind("</think>") {
        Some(pos) => &stripped[pos + "</think>".len()..],
        None => stripped.as_str(),
    };
    visible.trim().to_string()
}

/// Parse a classification reply
///
/// Accepts a JSON object `{"category": ..., "rationale": ...}` anywhere in the
/// text, or a bare category on the first non-empty line.
pub fn parse_suggestion(response: &str) -> Result<Suggestion, ServiceError> {
    let response = strip_think(response);

    let start = response.find('{');
    let end = response.rfind('}');

    if let (Some(s), Some(e)) = (start, end) {
        if s < e {
            let json_str = &response[s..=e];
            let suggestion: Suggestion = serde_json::from_str(json_str).map_err(|e| {
                ServiceError::InvalidResponse(format!(
                    "Invalid JSON from classifier: {} | Raw: {}",
                    e,
                    truncate(json_str)
                ))
            })?;
            if suggestion.category.trim().is_empty() {
                return Err(ServiceError::InvalidResponse(
                    "Classifier returned an empty category".into(),
                ));
            }
            return Ok(suggestion);
        }
    }

    let line = response
        .lines()
        .map(|l| l.trim().trim_matches('`').trim())
        .find(|l| !l.is_empty())
        .ok_or_else(|| ServiceError::InvalidResponse("Empty classifier response".into()))?;

    Ok(Suggestion::new(line))
}

fn truncate(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
