//! End-to-end query pipeline: retrieve → (reorder) → compose.
//!
//! [`Engine`] bundles the shared, read-only index with the collaborator
//! services. It is built once at startup and shared by reference (or `Arc`)
//! with every request handler; no request mutates it.

use serde::Serialize;
use std::sync::Arc;

use crate::answer::{compose, AnswerParams};
use crate::augment::AugmentParams;
use crate::error::{QueryError, Result};
use crate::index::MetadataIndex;
use crate::models::{AnswerResult, RetrievalResult};
use crate::rerank::{reorder, RerankParams};
use crate::retrieval::{retrieve, Retrieval, RetrievalParams, RetrievalRequest};
use crate::services::{CompletionService, DocumentStore, EmbeddingService};

/// All tuning knobs of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub retrieval: RetrievalParams,
    pub augment: AugmentParams,
    /// Paraphrase augmentation when the request does not say.
    pub augment_by_default: bool,
    pub rerank: RerankParams,
    /// Relevance reordering when the request does not say.
    pub rerank_by_default: bool,
    pub answer: AnswerParams,
}

/// One question from a caller.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub question: String,
    /// Result-count hint; overrides the configured `top_k`.
    pub top_k: Option<usize>,
    pub use_reranker: Option<bool>,
    pub augment: Option<bool>,
}

impl QueryRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }
}

/// Everything an evaluation harness or UI needs from one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: AnswerResult,
    /// Retrieval results in retrieval order, with sub-scores.
    pub retrieved: Vec<RetrievalResult>,
    pub query_tags: Vec<String>,
}

/// Shared query engine.
pub struct Engine {
    index: Arc<MetadataIndex>,
    embedder: Arc<dyn EmbeddingService>,
    completer: Arc<dyn CompletionService>,
    store: Arc<dyn DocumentStore>,
    params: QueryParams,
}

impl Engine {
    pub fn new(
        index: Arc<MetadataIndex>,
        embedder: Arc<dyn EmbeddingService>,
        completer: Arc<dyn CompletionService>,
        store: Arc<dyn DocumentStore>,
        params: QueryParams,
    ) -> Self {
        Self {
            index,
            embedder,
            completer,
            store,
            params,
        }
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// Hybrid retrieval only, without answer generation.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
        augment: Option<bool>,
    ) -> Result<Retrieval> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        let augment = augment
            .unwrap_or(self.params.augment_by_default)
            .then_some(&self.params.augment);
        let req = RetrievalRequest {
            query,
            top_k,
            augment,
        };
        retrieve(
            &self.index,
            self.embedder.as_ref(),
            self.completer.as_ref(),
            &self.params.retrieval,
            &req,
        )
        .await
    }

    /// Answer a question.
    ///
    /// # Errors
    ///
    /// Empty questions, invalid `top_k`, embedding failure, an unavailable
    /// document store, and a failed answer completion. Tag extraction,
    /// paraphrasing and reordering never fail a query.
    pub async fn query(&self, req: &QueryRequest) -> Result<QueryResponse> {
        let question = req.question.trim();
        let retrieval = self.retrieve(question, req.top_k, req.augment).await?;

        let use_reranker = req.use_reranker.unwrap_or(self.params.rerank_by_default);
        let ordered = if use_reranker {
            reorder(
                self.completer.as_ref(),
                &self.params.rerank,
                &self.params.retrieval.system_directive,
                self.index.conflict_pairs(),
                question,
                retrieval.results.clone(),
            )
            .await
        } else {
            retrieval.results.clone()
        };

        let answer = compose(
            self.completer.as_ref(),
            self.store.as_ref(),
            self.index.conflict_pairs(),
            &self.params.answer,
            question,
            &ordered,
        )
        .await?;

        tracing::info!(
            retrieved = retrieval.results.len(),
            reranked = use_reranker,
            has_contradiction = answer.has_contradiction,
            "query answered"
        );

        Ok(QueryResponse {
            answer,
            retrieved: retrieval.results,
            query_tags: retrieval.query_tags,
        })
    }
}
