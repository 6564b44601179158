//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/query` | Retrieve, optionally reorder, and answer a question |
//! | `GET`  | `/health` | Health check (version and document count) |
//! | `GET`  | `/index` | Index summary and known conflict pairs |
//! | `GET`  | `/` | Minimal question form |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_unavailable` (502),
//! `completion_unavailable` (502), `documents_unavailable` (503).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! and evaluation notebooks can call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;
use uuid::Uuid;

use kb_answer_core::error::QueryError;
use kb_answer_core::index::IndexSummary;
use kb_answer_core::models::RetrievalResult;
use kb_answer_core::pipeline::{Engine, QueryRequest};

use crate::config::Config;
use crate::engine::build_engine;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

/// Build the router over an already-constructed engine.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_home))
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .route("/index", get(handle_index))
        .layer(cors)
        .with_state(state)
}

/// Load the index, connect providers, and serve on `[server].bind` until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(build_engine(config)?);
    let app = router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "HTTP server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            QueryError::EmptyQuery | QueryError::InvalidTopK => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            QueryError::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_unavailable"),
            QueryError::Completion(_) => (StatusCode::BAD_GATEWAY, "completion_unavailable"),
            QueryError::DocumentStoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "documents_unavailable")
            }
        };
        if status.is_server_error() {
            tracing::error!(code, error = %message, "query failed");
        }
        AppError {
            status,
            code,
            message,
        }
    }
}

// ============ POST /query ============

#[derive(Debug, Deserialize)]
struct QueryBody {
    question: String,
    #[serde(default)]
    top_k: Option<i64>,
    #[serde(default)]
    use_reranker: Option<bool>,
    #[serde(default)]
    augment: Option<bool>,
}

#[derive(Debug, Serialize)]
struct QueryResponseBody {
    request_id: String,
    answer: String,
    sources: Vec<String>,
    has_contradiction: bool,
    retrieved: Vec<RetrievedBody>,
    query_tags: Vec<String>,
    context_size: usize,
}

#[derive(Debug, Serialize)]
struct RetrievedBody {
    filepath: String,
    score: f64,
    vec_score: f64,
    tag_score: f64,
    bm25_score: f64,
    description: String,
    status: String,
    last_modified: String,
    tags: Vec<String>,
}

impl From<&RetrievalResult> for RetrievedBody {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            filepath: r.record.path.clone(),
            score: round4(r.score),
            vec_score: round4(r.vector_score),
            tag_score: round4(r.tag_score),
            bm25_score: round4(r.bm25_score),
            description: r.record.description.clone(),
            status: r.record.status.clone(),
            last_modified: r.record.last_modified.clone(),
            tags: r.record.tags.iter().cloned().collect(),
        }
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryBody>, JsonRejection>,
) -> Result<Json<QueryResponseBody>, AppError> {
    let Json(body) = body.map_err(|e| bad_request(e.body_text()))?;

    let top_k = match body.top_k {
        None => None,
        Some(k) if k >= 1 => Some(k as usize),
        Some(_) => return Err(QueryError::InvalidTopK.into()),
    };
    let request = QueryRequest {
        question: body.question,
        top_k,
        use_reranker: body.use_reranker,
        augment: body.augment,
    };

    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("query", request_id = %request_id);
    let response = state.engine.query(&request).instrument(span).await?;

    Ok(Json(QueryResponseBody {
        request_id,
        answer: response.answer.answer,
        sources: response.answer.sources,
        has_contradiction: response.answer.has_contradiction,
        retrieved: response.retrieved.iter().map(RetrievedBody::from).collect(),
        query_tags: response.query_tags,
        context_size: response.answer.context_size,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    documents: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents: state.engine.index().len(),
    })
}

// ============ GET /index ============

#[derive(Serialize)]
struct IndexResponse {
    #[serde(flatten)]
    summary: IndexSummary,
    tag_vocabulary: Vec<String>,
    conflicts: Vec<[String; 2]>,
}

async fn handle_index(State(state): State<AppState>) -> Json<IndexResponse> {
    let index = state.engine.index();
    Json(IndexResponse {
        summary: index.summary(),
        tag_vocabulary: index.vocabulary().iter().cloned().collect(),
        conflicts: index
            .conflict_pairs()
            .iter()
            .map(|p| [p.first().to_string(), p.second().to_string()])
            .collect(),
    })
}

// ============ GET / ============

async fn handle_home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

const HOME_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>kb-answer</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
  textarea { width: 100%; min-height: 4rem; }
  pre { white-space: pre-wrap; background: #f5f5f5; padding: 1rem; }
  .warn { color: #a15c00; font-weight: 600; }
  table { border-collapse: collapse; font-size: 0.85rem; }
  td, th { border: 1px solid #ddd; padding: 0.2rem 0.4rem; text-align: left; }
</style>
</head>
<body>
<h1>Ask the knowledge base</h1>
<form id="ask">
  <textarea name="question" placeholder="How many PTO days do senior engineers get?"></textarea>
  <label><input type="checkbox" name="use_reranker"> rerank</label>
  <label><input type="checkbox" name="augment"> augment</label>
  <button type="submit">Ask</button>
</form>
<p id="flag" class="warn"></p>
<pre id="answer"></pre>
<table id="sources"></table>
<script>
document.getElementById("ask").addEventListener("submit", async (ev) => {
  ev.preventDefault();
  const f = ev.target;
  const answer = document.getElementById("answer");
  const flag = document.getElementById("flag");
  const table = document.getElementById("sources");
  answer.textContent = "…";
  flag.textContent = "";
  table.replaceChildren();
  const res = await fetch("/query", {
    method: "POST",
    headers: { "content-type": "application/json" },
    body: JSON.stringify({
      question: f.question.value,
      use_reranker: f.use_reranker.checked,
      augment: f.augment.checked,
    }),
  });
  const body = await res.json();
  if (!res.ok) { answer.textContent = body.error.code + ": " + body.error.message; return; }
  answer.textContent = body.answer;
  if (body.has_contradiction) flag.textContent = "Sources disagree on this topic.";
  const row = (cells, tag) => {
    const tr = table.insertRow();
    for (const value of cells) {
      const cell = document.createElement(tag);
      cell.textContent = String(value);
      tr.appendChild(cell);
    }
  };
  row(["file", "score", "vec", "tag", "bm25", "status"], "th");
  for (const r of body.retrieved) {
    row([r.filepath, r.score, r.vec_score, r.tag_score, r.bm25_score, r.status], "td");
  }
});
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round4() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(1.0), 1.0);
        assert_eq!(round4(0.0), 0.0);
    }

    #[test]
    fn test_error_mapping() {
        use kb_answer_core::error::ServiceError;

        let e: AppError = QueryError::EmptyQuery.into();
        assert_eq!((e.status, e.code), (StatusCode::BAD_REQUEST, "bad_request"));

        let e: AppError = QueryError::Embedding(ServiceError::Transport("x".into())).into();
        assert_eq!((e.status, e.code), (StatusCode::BAD_GATEWAY, "embedding_unavailable"));

        let e: AppError = QueryError::Completion(ServiceError::Status {
            status: 500,
            body: String::new(),
        })
        .into();
        assert_eq!((e.status, e.code), (StatusCode::BAD_GATEWAY, "completion_unavailable"));

        let e: AppError = QueryError::DocumentStoreUnavailable("gone".into()).into();
        assert_eq!(
            (e.status, e.code),
            (StatusCode::SERVICE_UNAVAILABLE, "documents_unavailable")
        );
    }
}
