//! # Output Parser
//!
//! Extracts JSON from generation output. Structured output passes through
//! (optionally projected through an expected key); text is stripped of
//! markdown fences and parsed. Failures are logged and yield `None`.

use crate::generation::Generation;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Fence patterns in priority order: labeled `json`, labeled `JSON`, unlabeled
fn fence_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?s)```json\s*(.*?)\s*```",
            r"(?s)```JSON\s*(.*?)\s*```",
            r"(?s)```[A-Za-z]*\s*(.*?)\s*```",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Strip a fenced code block, if any. Returns the candidate JSON text only
/// when it starts like a JSON object or array.
pub fn extract_json_from_markdown(text: &str) -> Option<String> {
    let fenced = fence_patterns()
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str());

    let candidate = fenced.unwrap_or(text).trim();
    (candidate.starts_with('{') || candidate.starts_with('[')).then(|| candidate.to_string())
}

/// Parse a generation into JSON.
///
/// `expected_key` projects the result: `value[expected_key]` when the value
/// is an object carrying that key, else the whole value. `context` names the
/// caller in log output.
pub fn parse_generation(
    output: &Generation,
    expected_key: Option<&str>,
    context: &str,
) -> Option<Value> {
    let value = match output {
        Generation::Structured(Value::Null) => {
            tracing::warn!(context, "Empty structured output");
            return None;
        }
        Generation::Structured(value) => value.clone(),
        Generation::Text(text) => parse_text(text, context)?,
    };

    Some(project(value, expected_key))
}

fn parse_text(text: &str, context: &str) -> Option<Value> {
    let Some(json_text) = extract_json_from_markdown(text) else {
        tracing::error!(
            context,
            snippet = %truncate(text, 100),
            "No JSON object or array found in output"
        );
        tracing::debug!(context, raw = %truncate(text, 500), "Unparsed output");
        return None;
    };

    match serde_json::from_str::<Value>(&json_text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(
                context,
                error = %e,
                snippet = %truncate(&json_text, 100),
                "Failed to parse JSON output"
            );
            tracing::debug!(context, raw = %truncate(text, 500), "Unparsed output");
            None
        }
    }
}

fn project(value: Value, expected_key: Option<&str>) -> Value {
    match (expected_key, value) {
        (Some(key), Value::Object(mut map)) if map.contains_key(key) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        (_, value) => value,
    }
}

/// Cut at a char boundary, at most `max` chars
fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_passthrough_and_projection() {
        let output = Generation::Structured(json!({"search_queries": ["a", "b"], "note": 1}));
        assert_eq!(
            parse_generation(&output, Some("search_queries"), "test"),
            Some(json!(["a", "b"]))
        );
        // Key absent: whole structure
        assert_eq!(
            parse_generation(&output, Some("papers"), "test"),
            Some(json!({"search_queries": ["a", "b"], "note": 1}))
        );
        // Lists are never projected
        let list = Generation::Structured(json!([{"title": "x"}]));
        assert_eq!(
            parse_generation(&list, Some("papers"), "test"),
            Some(json!([{"title": "x"}]))
        );
    }

    #[test]
    fn test_fenced_blocks() {
        let labeled = "Here you go:\n```json\n{\"papers\": []}\n```\nDone.";
        assert_eq!(extract_json_from_markdown(labeled).as_deref(), Some("{\"papers\": []}"));

        let upper = "```JSON\n[1, 2]\n```";
        assert_eq!(extract_json_from_markdown(upper).as_deref(), Some("[1, 2]"));

        let generic = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json_from_markdown(generic).as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_labeled_block_wins_over_earlier_generic_block() {
        let text = "```\nnot json\n```\n```json\n{\"ok\": true}\n```";
        assert_eq!(extract_json_from_markdown(text).as_deref(), Some("{\"ok\": true}"));
    }

    #[test]
    fn test_bare_json_text() {
        let output = Generation::Text("  {\"papers\": [{\"title\": \"T\"}]}  ".to_string());
        assert_eq!(
            parse_generation(&output, Some("papers"), "test"),
            Some(json!([{"title": "T"}]))
        );
    }

    #[test]
    fn test_malformed_text_yields_none() {
        assert_eq!(parse_generation(&Generation::Text("no json here".into()), None, "test"), None);
        assert_eq!(
            parse_generation(&Generation::Text("```json\n{\"a\": \n```".into()), None, "test"),
            None
        );
        assert_eq!(parse_generation(&Generation::Structured(Value::Null), None, "test"), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("ééé", 2), "éé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
