//! # kb-answer core
//!
//! Runtime-agnostic logic for kb-answer: the document data model, the BM25
//! scorer, the in-memory metadata index, hybrid retrieval, paraphrase
//! augmentation, relevance reordering, and contradiction-aware answer
//! composition.
//!
//! This crate contains no tokio, HTTP client, or filesystem I/O. External
//! collaborators (embedding service, completion service, document body
//! store) are reached through the traits in [`services`]; the application
//! crate supplies concrete implementations.
//!
//! ```text
//! query ─▶ retrieval ─▶ (rerank) ─▶ answer ─▶ AnswerResult
//!            │  ▲                      │
//!            ▼  │                      ▼
//!        index + bm25            document store
//! ```

pub mod answer;
pub mod augment;
pub mod bm25;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod payload;
pub mod pipeline;
pub mod rerank;
pub mod retrieval;
pub mod services;
