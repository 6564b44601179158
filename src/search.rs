//! Retrieval and question answering from the command line.
//!
//! `kba retrieve` runs hybrid retrieval only and prints the sub-score table;
//! `kba ask` runs the whole pipeline. Both load the index and connect the
//! configured services on every invocation.

use anyhow::Result;
use tracing::Instrument;
use uuid::Uuid;

use kb_answer_core::models::RetrievalResult;
use kb_answer_core::pipeline::QueryRequest;

use crate::config::Config;
use crate::engine::build_engine;

/// Options for `kba ask`.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub top_k: Option<usize>,
    /// `Some(true)` forces reordering; `None` uses `[rerank] enabled`.
    pub rerank: Option<bool>,
    pub augment: Option<bool>,
    pub json: bool,
}

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    augment: Option<bool>,
) -> Result<()> {
    let engine = build_engine(config)?;
    let retrieval = engine.retrieve(query, top_k, augment).await?;

    if retrieval.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !retrieval.query_tags.is_empty() {
        println!("query tags: {}", retrieval.query_tags.join(", "));
        println!();
    }
    print_table(&retrieval.results);
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, opts: &AskOptions) -> Result<()> {
    let engine = build_engine(config)?;
    let request = QueryRequest {
        question: question.to_string(),
        top_k: opts.top_k,
        use_reranker: opts.rerank,
        augment: opts.augment,
    };

    let request_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("query", request_id = %request_id);
    let response = engine.query(&request).instrument(span).await?;

    if opts.json {
        let out = serde_json::json!({
            "request_id": request_id,
            "answer": response.answer,
            "retrieved": response.retrieved,
            "query_tags": response.query_tags,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", response.answer.answer);
    println!();
    if response.answer.has_contradiction {
        println!("! Sources disagree on this topic; check the newer document.");
        println!();
    }
    if !response.answer.sources.is_empty() {
        println!("Sources ({}):", response.answer.context_size);
        for source in &response.answer.sources {
            println!("  {}", source);
        }
        println!();
        print_table(&response.retrieved);
    }
    Ok(())
}

fn print_table(results: &[RetrievalResult]) {
    println!(
        "{:>3}  {:>6}  {:>6}  {:>6}  {:>6}  {:<10}  path",
        "#", "score", "vec", "tag", "bm25", "status"
    );
    for (i, r) in results.iter().enumerate() {
        println!(
            "{:>3}  {:>6.4}  {:>6.4}  {:>6.4}  {:>6.4}  {:<10}  {}",
            i + 1,
            r.score,
            r.vector_score,
            r.tag_score,
            r.bm25_score,
            r.record.status,
            r.path()
        );
    }
}
