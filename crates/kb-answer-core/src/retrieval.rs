//! Hybrid retrieval over the metadata index.
//!
//! # Scoring
//!
//! For every document (index-aligned with the record order):
//!
//! 1. `vector`: cosine similarity between query and description embedding,
//!    rescaled from `[-1, 1]` to `[0, 1]`.
//! 2. `tag`: overlap coefficient `|Q ∩ D| / |Q|` between the query's
//!    extracted tags and the document's tags (0 when `Q` is empty).
//! 3. `bm25`: BM25 over descriptions divided by the batch maximum.
//!
//! `score = w_v · vector + w_t · tag + w_b · bm25`, defaults 0.55 / 0.25 / 0.20.
//! Results are sorted by score (desc, ties in load order) and the walk stops
//! at `top_k` or at the first score below `min_score`, whichever comes first.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::augment::{embed_augmented, AugmentParams};
use crate::embedding::{dot, normalized, rescale_similarity};
use crate::error::{QueryError, Result, ServiceError};
use crate::index::MetadataIndex;
use crate::models::RetrievalResult;
use crate::payload::{parse_payload, TagsPayload};
use crate::services::{CompletionRequest, CompletionService, EmbeddingService};

/// Linear-combination weights for the three sub-scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub vector: f64,
    pub tag: f64,
    pub bm25: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            vector: 0.55,
            tag: 0.25,
            bm25: 0.20,
        }
    }
}

/// Retrieval tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Maximum results returned.
    pub top_k: usize,
    pub weights: ScoreWeights,
    /// Walk over the sorted list stops at the first score below this.
    pub min_score: f64,
    /// Prepended to the system instruction of auxiliary JSON calls.
    pub system_directive: String,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 10,
            weights: ScoreWeights::default(),
            min_score: 0.05,
            system_directive: "/no_think".to_string(),
        }
    }
}

/// Inputs for a single retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub query: &'a str,
    /// Overrides [`RetrievalParams::top_k`] when set.
    pub top_k: Option<usize>,
    /// Blend paraphrase embeddings into the query vector when set.
    pub augment: Option<&'a AugmentParams>,
}

/// Ranked results plus the query's extracted tags.
#[derive(Debug, Clone, Serialize)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    pub query_tags: Vec<String>,
}

/// Per-document sub-scores for one query, before ranking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRow {
    /// Row in the metadata index.
    pub row: usize,
    pub vector: f64,
    pub tag: f64,
    pub bm25: f64,
    pub combined: f64,
}

/// Run the full retrieval for one query.
///
/// # Errors
///
/// Only a failed (or dimensionally wrong) query embedding is fatal. Tag
/// extraction failure degrades to an empty tag set.
pub async fn retrieve(
    index: &MetadataIndex,
    embedder: &dyn EmbeddingService,
    completer: &dyn CompletionService,
    params: &RetrievalParams,
    req: &RetrievalRequest<'_>,
) -> Result<Retrieval> {
    let top_k = req.top_k.unwrap_or(params.top_k);
    if top_k == 0 {
        return Err(QueryError::InvalidTopK);
    }

    let raw_vec = match req.augment {
        Some(augment) => {
            embed_augmented(embedder, completer, augment, &params.system_directive, req.query)
                .await
        }
        None => embedder.embed_one(req.query).await,
    }
    .map_err(QueryError::Embedding)?;

    if !index.is_empty() && raw_vec.len() != index.dims() {
        return Err(QueryError::Embedding(ServiceError::InvalidResponse(format!(
            "query embedding has {} dimensions, index has {}",
            raw_vec.len(),
            index.dims()
        ))));
    }
    let query_vec = normalized(&raw_vec);

    let query_tags =
        extract_query_tags(completer, index.vocabulary(), req.query, &params.system_directive)
            .await;

    let scored = score_documents(index, &query_vec, &query_tags, req.query, &params.weights);
    let selected = select_top(scored, top_k, params.min_score);

    let tags: Vec<String> = query_tags.into_iter().collect();
    let results = selected
        .into_iter()
        .map(|row| {
            tracing::debug!(
                path = %index.records()[row.row].path,
                score = row.combined,
                vector = row.vector,
                tag = row.tag,
                bm25 = row.bm25,
                "retrieved"
            );
            RetrievalResult {
                record: index.records()[row.row].clone(),
                vector_score: row.vector,
                tag_score: row.tag,
                bm25_score: row.bm25,
                score: row.combined,
                query_tags: tags.clone(),
            }
        })
        .collect();

    Ok(Retrieval {
        results,
        query_tags: tags,
    })
}

/// Compute the three sub-scores and their combination for every document.
///
/// `query_vec` must already be unit length.
pub fn score_documents(
    index: &MetadataIndex,
    query_vec: &[f32],
    query_tags: &BTreeSet<String>,
    query: &str,
    weights: &ScoreWeights,
) -> Vec<ScoredRow> {
    let bm25 = normalize_by_max(&index.bm25().score(query));

    index
        .records()
        .iter()
        .zip(index.embeddings())
        .zip(bm25)
        .enumerate()
        .map(|(row, ((record, embedding), lexical))| {
            let vector = rescale_similarity(dot(embedding, query_vec));
            let tag = overlap_coefficient(query_tags, &record.tags);
            let combined = weights.vector * vector + weights.tag * tag + weights.bm25 * lexical;
            ScoredRow {
                row,
                vector,
                tag,
                bm25: lexical,
                combined,
            }
        })
        .collect()
}

/// Sort by combined score (desc, stable) and walk until `top_k` results or
/// the first score below `min_score`.
pub fn select_top(mut scored: Vec<ScoredRow>, top_k: usize, min_score: f64) -> Vec<ScoredRow> {
    scored.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
        .into_iter()
        .take(top_k)
        .take_while(|row| row.combined >= min_score)
        .collect()
}

/// `|query ∩ doc| / |query|`, or `0.0` for an empty query set.
pub fn overlap_coefficient(query_tags: &BTreeSet<String>, doc_tags: &BTreeSet<String>) -> f64 {
    if query_tags.is_empty() {
        return 0.0;
    }
    query_tags.intersection(doc_tags).count() as f64 / query_tags.len() as f64
}

/// Divide by the maximum so the largest score becomes 1. All-zero input stays zero.
pub fn normalize_by_max(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(0.0f64, f64::max);
    if max <= 0.0 {
        return scores.to_vec();
    }
    scores.iter().map(|s| s / max).collect()
}

/// Ask the completion service for 2–6 tags from the canonical vocabulary.
///
/// Anything outside the vocabulary is discarded. Any failure yields an empty set.
pub async fn extract_query_tags(
    completer: &dyn CompletionService,
    vocabulary: &BTreeSet<String>,
    query: &str,
    system_directive: &str,
) -> BTreeSet<String> {
    if vocabulary.is_empty() {
        return BTreeSet::new();
    }

    let allowed = vocabulary
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let prompt = format!(
        "Select tags for this query. You MUST only use tags from the EXACT list below — no other tags allowed.\n\n\
         ALLOWED TAGS (use ONLY these exact strings):\n{allowed}\n\n\
         User query: {query}\n\n\
         Pick 2-6 tags that best match the query topic. Return ONLY tags from the list above.\n\
         Return JSON: {{\"tags\": [\"tag1\", \"tag2\", ...]}}"
    );
    let request = CompletionRequest::json(system_directive, prompt, 200);

    let raw = match completer.complete(&request).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "tag extraction failed; continuing without tags");
            return BTreeSet::new();
        }
    };

    let Some(payload) = parse_payload::<TagsPayload>(&raw) else {
        tracing::warn!("tag extraction returned no usable JSON; continuing without tags");
        return BTreeSet::new();
    };

    payload
        .tags
        .iter()
        .filter_map(|t| t.as_str())
        .filter(|t| vocabulary.contains(*t))
        .map(str::to_string)
        .collect()
}
