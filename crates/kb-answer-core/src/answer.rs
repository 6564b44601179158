//! Grounded answer composition.
//!
//! The composer loads the full body of every retrieved document (in the
//! order given), frames them as numbered source blocks, and asks the
//! completion service for an answer under a fixed system instruction that
//! enforces citation, contradiction surfacing and abstention. The raw
//! completion has reasoning blocks stripped, and the contradiction flag is
//! derived independently from the answer wording and the index's conflict
//! metadata.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{FetchError, QueryError, Result};
use crate::models::{AnswerResult, ConflictPair, RetrievalResult};
use crate::payload::strip_reasoning;
use crate::services::{CompletionRequest, CompletionService, DocumentStore};

/// Fixed abstention sentence.
pub const IDK_ANSWER: &str =
    "I don't have enough information to answer this question based on the available knowledge base.";

/// System instruction for the answer call.
pub const SYSTEM_PROMPT: &str = "/no_think
You are an internal knowledge base assistant.

Rules:
1. Answer ONLY using the provided source documents. Do not use outside knowledge.
2. Always cite your sources at the end as: [Source: filename] or [Sources: file1, file2].
3. If multiple documents CONTRADICT each other on the same topic, you MUST surface both versions explicitly. State which document is newer (use last_modified dates) and recommend the newer one as authoritative.
4. If the answer is not present in any source document, say: \"I don't have enough information to answer this question based on the available knowledge base.\" Important distinction: if a specific policy, guide, or document is asked about and it does NOT exist in the provided sources (even if loosely related documents exist), say IDK — do not synthesize a substitute answer from tangentially related material. But if the sources DO explicitly contain the relevant facts (even spread across paragraphs), provide the answer normally.
5. Be concise and direct. If the question is procedural (how to do X), provide numbered steps.
6. Do NOT invent information, dates, names, or numbers not present in the sources.
7. If a source contains \"[File not found: ...]\", that document does not exist in the knowledge base. If the question is specifically about that missing document's content, say IDK.
";

/// Caution directive injected when retrieval confidence is low.
pub const LOW_CONFIDENCE_HINT: &str = "
RETRIEVAL NOTE: The retrieved documents have low relevance scores for this query.
The information you need may not be present in the knowledge base.
Only answer if the sources EXPLICITLY contain the answer. Otherwise use Rule 4 (say IDK).
";

/// Phrases in a generated answer that indicate it surfaced a contradiction.
pub const CONTRADICTION_KEYWORDS: [&str; 13] = [
    "contradict",
    "conflict",
    "disagree",
    "inconsistent",
    "older policy",
    "newer policy",
    "discrepancy",
    "two versions",
    "two documents",
    "both documents",
    "earlier version",
    "updated policy",
    "superseded",
];

const TRUNCATION_MARKER: &str = "\n[... truncated ...]";

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerParams {
    /// Per-document body limit, in characters.
    pub max_file_chars: usize,
    /// Below this best combined score the caution directive is added.
    pub min_retrieval_score: f64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AnswerParams {
    fn default() -> Self {
        Self {
            max_file_chars: 8000,
            min_retrieval_score: 0.52,
            temperature: 0.1,
            max_tokens: 1500,
        }
    }
}

/// The answer for an empty retrieval: no model call is made.
pub fn abstain() -> AnswerResult {
    AnswerResult {
        answer: IDK_ANSWER.to_string(),
        sources: Vec::new(),
        has_contradiction: false,
        context_size: 0,
    }
}

/// Compose the grounded answer for `results`, in the order given.
///
/// # Errors
///
/// Fails only when the document store is unavailable as a whole or the
/// answer completion itself fails.
pub async fn compose(
    completer: &dyn CompletionService,
    store: &dyn DocumentStore,
    conflict_pairs: &[ConflictPair],
    params: &AnswerParams,
    query: &str,
    results: &[RetrievalResult],
) -> Result<AnswerResult> {
    if results.is_empty() {
        return Ok(abstain());
    }

    let context = build_context(store, results, params.max_file_chars).await?;
    let present = present_conflicts(results, conflict_pairs);

    let max_score = results.iter().map(|r| r.score).fold(f64::MIN, f64::max);
    let retrieval_hint = if max_score < params.min_retrieval_score {
        tracing::debug!(max_score, "low retrieval confidence; adding caution directive");
        LOW_CONFIDENCE_HINT
    } else {
        ""
    };
    let conflict_hint = conflict_note(&present, results).unwrap_or_default();

    let user = format!(
        "Source documents:\n{context}\n{conflict_hint}{retrieval_hint}\n\
         Question: {query}\n\n\
         Answer the question based strictly on the source documents above."
    );
    let request = CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        user,
        temperature: params.temperature,
        max_tokens: params.max_tokens,
        json_mode: false,
    };

    let raw = completer
        .complete(&request)
        .await
        .map_err(QueryError::Completion)?;
    let answer = strip_reasoning(&raw);

    let has_contradiction = has_contradiction_language(&answer) || !present.is_empty();

    Ok(AnswerResult {
        answer,
        sources: results.iter().map(|r| r.path().to_string()).collect(),
        has_contradiction,
        context_size: results.len(),
    })
}

/// Concatenate every result's body into headed, numbered source blocks.
pub async fn build_context(
    store: &dyn DocumentStore,
    results: &[RetrievalResult],
    max_file_chars: usize,
) -> Result<String> {
    let mut parts = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let body = load_body(store, result.path()).await?;
        let body = truncate_chars(&body, max_file_chars);

        let record = &result.record;
        let meta = [
            ("last_modified", &record.last_modified),
            ("status", &record.status),
            ("author", &record.author),
        ]
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" | ");

        parts.push(format!(
            "=== SOURCE {}: {} ({meta}) ===\n{body}\n",
            i + 1,
            record.path
        ));
    }
    Ok(parts.join("\n"))
}

/// Fetch and render one document body as the model should see it.
///
/// Missing and unreadable documents become inline markers; only an
/// unavailable store is an error.
pub async fn load_body(store: &dyn DocumentStore, path: &str) -> Result<String> {
    match store.fetch(path).await {
        Ok(text) => Ok(render_body(path, &text)),
        Err(FetchError::NotFound(_)) => {
            tracing::warn!(path, "retrieved document not found in the document store");
            Ok(format!("[File not found: {path}]"))
        }
        Err(FetchError::Unreadable { reason, .. }) => {
            tracing::warn!(path, %reason, "retrieved document could not be read");
            Ok(format!("[Could not read: {reason}]"))
        }
        Err(FetchError::Unavailable(reason)) => Err(QueryError::DocumentStoreUnavailable(reason)),
    }
}

/// Render raw file text: JSON message logs (arrays of objects) are flattened,
/// everything else is verbatim.
pub fn render_body(path: &str, text: &str) -> String {
    if !is_json_path(path) {
        return text.to_string();
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(messages)) if messages.iter().all(Value::is_object) => {
            flatten_messages(&messages)
        }
        Ok(_) => text.to_string(),
        Err(e) => {
            tracing::warn!(path, error = %e, "message log could not be parsed");
            format!("[Could not parse: {e}]")
        }
    }
}

fn is_json_path(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("json"))
}

/// One line per message: `[timestamp-prefix] #channel user: text`.
pub fn flatten_messages(messages: &[Value]) -> String {
    messages
        .iter()
        .map(|msg| {
            let field = |key: &str| msg.get(key).and_then(Value::as_str);
            let ts: String = field("timestamp").unwrap_or("").chars().take(16).collect();
            let user = field("user").unwrap_or("unknown");
            let channel = field("channel").unwrap_or("");
            let text = field("text").unwrap_or("");
            format!("[{ts}] #{channel} {user}: {text}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep the first `max_chars` characters, appending a marker if anything was cut.
pub fn truncate_chars(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &content[..byte_idx]),
        None => content.to_string(),
    }
}

/// True when the answer text contains a contradiction phrase.
pub fn has_contradiction_language(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    CONTRADICTION_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Known conflict pairs with both members in `results`.
pub fn present_conflicts<'a>(
    results: &[RetrievalResult],
    conflict_pairs: &'a [ConflictPair],
) -> Vec<&'a ConflictPair> {
    let paths: HashSet<&str> = results.iter().map(|r| r.path()).collect();
    conflict_pairs
        .iter()
        .filter(|pair| pair.is_within(&paths))
        .collect()
}

/// Prompt note naming each present conflict and, where dates allow, the newer side.
fn conflict_note(present: &[&ConflictPair], results: &[RetrievalResult]) -> Option<String> {
    if present.is_empty() {
        return None;
    }
    let modified = |path: &str| {
        results
            .iter()
            .find(|r| r.path() == path)
            .map(|r| r.record.last_modified.as_str())
            .unwrap_or("")
    };

    let mut note = String::from("\nKNOWN CONFLICTS between retrieved sources (apply Rule 3):\n");
    for pair in present {
        let (a, b) = (pair.first(), pair.second());
        let (ma, mb) = (modified(a), modified(b));
        let newer = match (parse_timestamp(ma), parse_timestamp(mb)) {
            (Some(ta), Some(tb)) if ta > tb => format!("; newer: {a}"),
            (Some(ta), Some(tb)) if tb > ta => format!("; newer: {b}"),
            _ => String::new(),
        };
        note.push_str(&format!(
            "- {a} (last_modified={ma}) vs {b} (last_modified={mb}){newer}\n"
        ));
    }
    Some(note)
}

/// Parse the last-modified formats seen in metadata stores.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::record;

    fn result(path: &str, last_modified: &str) -> RetrievalResult {
        let mut rec = record(path, "desc", &[]);
        rec.last_modified = last_modified.to_string();
        RetrievalResult {
            record: rec,
            vector_score: 0.0,
            tag_score: 0.0,
            bm25_score: 0.0,
            score: 0.6,
            query_tags: Vec::new(),
        }
    }

    #[test]
    fn test_abstain_shape() {
        let a = abstain();
        assert_eq!(a.answer, IDK_ANSWER);
        assert!(a.sources.is_empty());
        assert!(!a.has_contradiction);
        assert_eq!(a.context_size, 0);
    }

    #[test]
    fn test_contradiction_language() {
        assert!(has_contradiction_language("These two documents CONFLICT on PTO."));
        assert!(has_contradiction_language("The older policy said 15 days."));
        assert!(!has_contradiction_language("Senior engineers get 20 PTO days."));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc\n[... truncated ...]");
        // Multi-byte characters are counted, not bytes.
        assert_eq!(truncate_chars("ééééé", 2), "éé\n[... truncated ...]");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    #[test]
    fn test_render_body_flattens_message_log() {
        let log = r#"[
            {"timestamp": "2024-03-01T10:15:42Z", "user": "dana", "channel": "eng", "text": "deploy done"},
            {"text": "no metadata"}
        ]"#;
        let out = render_body("slack/eng.json", log);
        assert_eq!(
            out,
            "[2024-03-01T10:15] #eng dana: deploy done\n[] # unknown: no metadata"
        );
    }

    #[test]
    fn test_render_body_other_formats() {
        assert_eq!(render_body("a.md", "# Title"), "# Title");
        assert_eq!(render_body("cfg.json", r#"{"k": 1}"#), r#"{"k": 1}"#);
        assert!(render_body("bad.JSON", "{not json").starts_with("[Could not parse:"));
    }

    #[test]
    fn test_render_body_keeps_non_message_arrays() {
        let dates = r#"["2024-12-25", "2025-01-01"]"#;
        assert_eq!(render_body("holidays.json", dates), dates);

        let mixed = r#"[{"user": "sam", "text": "hi"}, 3]"#;
        assert_eq!(render_body("mixed.json", mixed), mixed);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let d = parse_timestamp("2024-06-01").unwrap();
        assert_eq!(d.to_string(), "2024-06-01 00:00:00");
        assert!(parse_timestamp("2024-06-01T08:00:00Z").is_some());
        assert!(parse_timestamp("2024-06-01 08:00:00").is_some());
        assert!(parse_timestamp("last tuesday").is_none());
    }

    #[test]
    fn test_conflict_note_names_newer() {
        let results = vec![result("a.md", "2023-01-01"), result("b.md", "2024-06-01")];
        let pair = ConflictPair::new("b.md", "a.md");
        let note = conflict_note(&[&pair], &results).unwrap();
        assert!(note.contains("a.md (last_modified=2023-01-01) vs b.md (last_modified=2024-06-01)"));
        assert!(note.contains("newer: b.md"));
    }

    #[test]
    fn test_present_conflicts() {
        let results = vec![result("a.md", ""), result("c.md", "")];
        let pairs = [ConflictPair::new("a.md", "b.md"), ConflictPair::new("a.md", "c.md")];
        let present = present_conflicts(&results, &pairs);
        assert_eq!(present, vec![&pairs[1]]);
    }
}
