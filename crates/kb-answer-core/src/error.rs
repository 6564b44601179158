//! Error types at the service boundary.
//!
//! [`ServiceError`] and [`FetchError`] come back from collaborators;
//! [`QueryError`] is what a query surfaces to its caller.

pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// Failure of a call to an external model service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("service unreachable: {0}")]
    Transport(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid service response: {0}")]
    InvalidResponse(String),
}

/// Failure to load a document body.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("could not read {path}: {reason}")]
    Unreadable { path: String, reason: String },
    /// The store as a whole cannot serve any document.
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a whole query. Fail-soft steps never produce one of these.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("question must not be empty")]
    EmptyQuery,
    #[error("top_k must be at least 1")]
    InvalidTopK,
    #[error("query embedding failed: {0}")]
    Embedding(#[source] ServiceError),
    #[error("answer generation failed: {0}")]
    Completion(#[source] ServiceError),
    #[error("{0}")]
    DocumentStoreUnavailable(String),
}
