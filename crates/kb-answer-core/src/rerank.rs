//! Relevance reordering with conflict-pair promotion.
//!
//! 1. The completion service proposes a total order over the retrieved
//!    documents (path + truncated description). Its answer is sanitized into a
//!    permutation: bad indices are dropped, duplicates keep their first
//!    position, and anything missing is appended in original order.
//! 2. Every known conflict pair with both members retrieved is moved to the
//!    front, keeping the relative order of promoted and non-promoted
//!    documents, so the answer step always sees both sides early.
//!
//! Nothing is ever filtered out: contradiction surfacing and abstention both
//! depend on the composer seeing the full retrieved set.

use serde_json::Value;
use std::collections::HashSet;

use crate::models::{ConflictPair, RetrievalResult};
use crate::payload::{parse_payload, OrderPayload};
use crate::services::{CompletionRequest, CompletionService};

#[derive(Debug, Clone, PartialEq)]
pub struct RerankParams {
    /// Description characters shown per candidate.
    pub description_chars: usize,
}

impl Default for RerankParams {
    fn default() -> Self {
        Self {
            description_chars: 120,
        }
    }
}

/// Relevance sort followed by conflict-pair promotion.
pub async fn reorder(
    completer: &dyn CompletionService,
    params: &RerankParams,
    system_directive: &str,
    conflict_pairs: &[ConflictPair],
    query: &str,
    results: Vec<RetrievalResult>,
) -> Vec<RetrievalResult> {
    let sorted = sort_by_relevance(completer, params, system_directive, query, results).await;
    promote_conflict_pairs(sorted, conflict_pairs)
}

/// Ask the completion service to order `results` by relevance.
///
/// Fewer than two results, or any failure, returns the input unchanged.
pub async fn sort_by_relevance(
    completer: &dyn CompletionService,
    params: &RerankParams,
    system_directive: &str,
    query: &str,
    results: Vec<RetrievalResult>,
) -> Vec<RetrievalResult> {
    if results.len() < 2 {
        return results;
    }

    let candidates = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let desc: String = r
                .record
                .description
                .chars()
                .take(params.description_chars)
                .collect();
            format!("{i}: [{}] {desc}", r.path())
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Sort these documents by relevance to the user question.\n\
         Return ALL indices, most relevant first.\n\n\
         Question: {query}\n\n\
         Documents:\n{candidates}\n\n\
         Return JSON: {{\"order\": [most_relevant_idx, ..., least_relevant_idx]}}"
    );
    let request = CompletionRequest::json(system_directive, prompt, 150);

    let raw = match completer.complete(&request).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "relevance sort failed; keeping retrieval order");
            return results;
        }
    };

    let Some(payload) = parse_payload::<OrderPayload>(&raw) else {
        tracing::warn!("relevance sort returned no usable JSON; keeping retrieval order");
        return results;
    };

    let order = sanitize_order(&payload.order, results.len());
    apply_permutation(results, &order)
}

/// Turn a model-proposed order into a full permutation of `0..len`.
pub fn sanitize_order(proposed: &[Value], len: usize) -> Vec<usize> {
    let mut seen = vec![false; len];
    let mut order = Vec::with_capacity(len);

    for value in proposed {
        let Some(i) = value.as_u64().map(|i| i as usize) else {
            continue;
        };
        if i < len && !seen[i] {
            seen[i] = true;
            order.push(i);
        }
    }

    order.extend((0..len).filter(|&i| !seen[i]));
    order
}

fn apply_permutation(results: Vec<RetrievalResult>, order: &[usize]) -> Vec<RetrievalResult> {
    let mut slots: Vec<Option<RetrievalResult>> = results.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

/// Move both members of every fully-present conflict pair to the front.
///
/// Promoted documents keep their relative order, as do the rest.
pub fn promote_conflict_pairs(
    results: Vec<RetrievalResult>,
    conflict_pairs: &[ConflictPair],
) -> Vec<RetrievalResult> {
    if conflict_pairs.is_empty() {
        return results;
    }

    let present: HashSet<&str> = results.iter().map(|r| r.path()).collect();
    let promoted: HashSet<String> = conflict_pairs
        .iter()
        .filter(|pair| pair.is_within(&present))
        .flat_map(|pair| [pair.first().to_string(), pair.second().to_string()])
        .collect();

    if promoted.is_empty() {
        return results;
    }

    let (mut front, rest): (Vec<_>, Vec<_>) = results
        .into_iter()
        .partition(|r| promoted.contains(r.path()));
    front.extend(rest);
    front
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::record;
    use serde_json::json;

    fn result(path: &str) -> RetrievalResult {
        RetrievalResult {
            record: record(path, "desc", &[]),
            vector_score: 0.0,
            tag_score: 0.0,
            bm25_score: 0.0,
            score: 0.5,
            query_tags: Vec::new(),
        }
    }

    fn paths(results: &[RetrievalResult]) -> Vec<&str> {
        results.iter().map(|r| r.path()).collect()
    }

    #[test]
    fn test_sanitize_order_valid() {
        let order = sanitize_order(&[json!(2), json!(0), json!(1)], 3);
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_sanitize_order_drops_garbage_and_appends_missing() {
        let proposed = [json!(5), json!("1"), json!(1.5), json!(-1), json!(2), json!(null)];
        assert_eq!(sanitize_order(&proposed, 4), vec![2, 0, 1, 3]);
    }

    #[test]
    fn test_sanitize_order_removes_duplicates() {
        let proposed = [json!(1), json!(1), json!(0), json!(1)];
        assert_eq!(sanitize_order(&proposed, 3), vec![1, 0, 2]);
    }

    #[test]
    fn test_sanitize_order_empty_is_identity() {
        assert_eq!(sanitize_order(&[], 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_promote_moves_pair_before_others() {
        let results = vec![result("c.md"), result("b.md"), result("d.md"), result("a.md")];
        let pairs = [ConflictPair::new("a.md", "b.md")];
        let out = promote_conflict_pairs(results, &pairs);
        assert_eq!(paths(&out), vec!["b.md", "a.md", "c.md", "d.md"]);
    }

    #[test]
    fn test_promote_ignores_partial_pairs() {
        let results = vec![result("c.md"), result("a.md")];
        let pairs = [ConflictPair::new("a.md", "b.md")];
        let out = promote_conflict_pairs(results, &pairs);
        assert_eq!(paths(&out), vec!["c.md", "a.md"]);
    }

    #[test]
    fn test_promote_multiple_pairs_keep_relative_order() {
        let results = vec![
            result("x.md"),
            result("d.md"),
            result("a.md"),
            result("y.md"),
            result("c.md"),
            result("b.md"),
        ];
        let pairs = [ConflictPair::new("a.md", "b.md"), ConflictPair::new("c.md", "d.md")];
        let out = promote_conflict_pairs(results, &pairs);
        assert_eq!(paths(&out), vec!["d.md", "a.md", "c.md", "b.md", "x.md", "y.md"]);
    }
}
