//! Paraphrase augmentation of the query embedding.
//!
//! The completion service rewrites the question `count` ways while keeping
//! named entities verbatim. The original and all paraphrases are embedded in
//! one batch and averaged: the original gets `original_weight`, the
//! paraphrases share the rest evenly. Only the vector score is affected; tag
//! extraction and BM25 still see the original question.

use crate::embedding::blend;
use crate::error::ServiceError;
use crate::payload::{parse_payload, ParaphrasePayload};
use crate::services::{CompletionRequest, CompletionService, EmbeddingService};

#[derive(Debug, Clone, PartialEq)]
pub struct AugmentParams {
    /// Number of paraphrases requested.
    pub count: usize,
    /// Weight of the original question in the blended vector.
    pub original_weight: f32,
}

impl Default for AugmentParams {
    fn default() -> Self {
        Self {
            count: 3,
            original_weight: 0.5,
        }
    }
}

/// Ask for up to `count` paraphrases. Returns an empty list on any failure.
pub async fn generate_paraphrases(
    completer: &dyn CompletionService,
    query: &str,
    count: usize,
    system_directive: &str,
) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }

    let prompt = format!(
        "Generate {count} paraphrases of the question below.\n\
         Rules:\n\
         - Keep ALL named entities exactly as written: numbers, product names, system names, people's names, tool names.\n\
         - Only rephrase the surrounding words and sentence structure.\n\
         - Each paraphrase must ask the same question in a different way.\n\n\
         Question: {query}\n\n\
         Return JSON: {{\"paraphrases\": [\"...\", \"...\", \"...\"]}}"
    );
    let request = CompletionRequest::json(system_directive, prompt, 300).with_temperature(0.7);

    let raw = match completer.complete(&request).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "paraphrase generation failed; using plain query embedding");
            return Vec::new();
        }
    };

    let Some(payload) = parse_payload::<ParaphrasePayload>(&raw) else {
        tracing::warn!("paraphrase generation returned no usable JSON");
        return Vec::new();
    };

    payload
        .paraphrases
        .iter()
        .filter_map(|p| p.as_str())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .take(count)
        .map(str::to_string)
        .collect()
}

/// Embed `query` blended with its paraphrases.
///
/// Falls back to the single-query embedding when no paraphrases are
/// produced. Embedding errors propagate: without a query vector there is no
/// similarity signal.
pub async fn embed_augmented(
    embedder: &dyn EmbeddingService,
    completer: &dyn CompletionService,
    params: &AugmentParams,
    system_directive: &str,
    query: &str,
) -> Result<Vec<f32>, ServiceError> {
    let paraphrases = generate_paraphrases(completer, query, params.count, system_directive).await;
    if paraphrases.is_empty() {
        return embedder.embed_one(query).await;
    }

    tracing::debug!(count = paraphrases.len(), "blending paraphrase embeddings");

    let mut texts = Vec::with_capacity(paraphrases.len() + 1);
    texts.push(query.to_string());
    texts.extend(paraphrases);

    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != texts.len() {
        return Err(ServiceError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            texts.len(),
            vectors.len()
        )));
    }

    blend(&vectors, params.original_weight).ok_or_else(|| {
        ServiceError::InvalidResponse("paraphrase embeddings have inconsistent dimensions".into())
    })
}
