//! Parsing of model output at the service boundary.
//!
//! Completion services are asked for JSON but are never trusted to return it.
//! Everything that reaches core logic first passes through [`parse_payload`],
//! which tolerates reasoning blocks, Markdown fences and surrounding prose,
//! and only yields a value when the text deserializes into the expected
//! payload type.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

fn reasoning_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<think>.*?</think>\s*").expect("valid regex"))
}

/// Remove `<think>…</think>` blocks and trim the remainder.
pub fn strip_reasoning(text: &str) -> String {
    reasoning_block().replace_all(text, "").trim().to_string()
}

/// Locate the JSON object in a model response.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let cleaned = strip_reasoning(text);
    let unfenced = strip_code_fence(&cleaned);

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(unfenced) {
        return Some(value);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&unfenced[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Deserialize a model response into `T`, or `None` if it does not fit.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Option<T> {
    let value = extract_json_object(text)?;
    serde_json::from_value(value).ok()
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line (e.g. ```json).
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// `{"tags": [...]}` from the tag-extraction call.
#[derive(Debug, Default, Deserialize)]
pub struct TagsPayload {
    #[serde(default)]
    pub tags: Vec<Value>,
}

/// `{"paraphrases": [...]}` from the augmentation call.
#[derive(Debug, Default, Deserialize)]
pub struct ParaphrasePayload {
    #[serde(default)]
    pub paraphrases: Vec<Value>,
}

/// `{"order": [...]}` from the relevance-sort call.
#[derive(Debug, Default, Deserialize)]
pub struct OrderPayload {
    #[serde(default)]
    pub order: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_reasoning_removes_blocks() {
        let raw = "<think>\nlet me see\n</think>\n\nThe answer is 20 days.";
        assert_eq!(strip_reasoning(raw), "The answer is 20 days.");
    }

    #[test]
    fn test_strip_reasoning_multiple_blocks() {
        let raw = "<think>a</think>One. <think>b</think>Two.";
        assert_eq!(strip_reasoning(raw), "One. Two.");
    }

    #[test]
    fn test_strip_reasoning_without_blocks() {
        assert_eq!(strip_reasoning("  plain  "), "plain");
    }

    #[test]
    fn test_extract_plain_object() {
        let v = extract_json_object(r#"{"tags": ["pto"]}"#).unwrap();
        assert_eq!(v["tags"][0], "pto");
    }

    #[test]
    fn test_extract_fenced_object() {
        let v = extract_json_object("```json\n{\"order\": [1, 0]}\n```").unwrap();
        assert_eq!(v["order"][0], 1);
    }

    #[test]
    fn test_extract_object_with_prose_and_reasoning() {
        let raw = "<think>hmm</think>Sure! Here you go: {\"paraphrases\": [\"a\"]} hope it helps";
        let v = extract_json_object(raw).unwrap();
        assert_eq!(v["paraphrases"][0], "a");
    }

    #[test]
    fn test_extract_rejects_non_objects() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn test_parse_payload_wrong_shape() {
        let parsed: Option<TagsPayload> = parse_payload(r#"{"tags": "pto"}"#);
        assert!(parsed.is_none());
        let parsed: Option<TagsPayload> = parse_payload(r#"{"other": 1}"#);
        assert!(parsed.unwrap().tags.is_empty());
    }
}
