//! Wiring: config → index, providers, document store → [`Engine`].

use anyhow::{Context, Result};
use std::sync::Arc;

use kb_answer_core::pipeline::Engine;

use crate::completion::OpenAiChat;
use crate::config::{require_endpoints, Config};
use crate::docstore::FsDocumentStore;
use crate::embedding::OpenAiEmbedder;
use crate::metadata::load_index;

/// Load the index and connect the HTTP providers.
///
/// Fails on a missing endpoint, a missing API key variable, or any index
/// load error. The services themselves are not contacted here.
pub fn build_engine(config: &Config) -> Result<Engine> {
    require_endpoints(config)?;

    let index = load_index(config)?;

    let embedder = OpenAiEmbedder::new(&config.embedding).context("embedding provider")?;
    let completer = OpenAiChat::new(&config.llm).context("completion provider")?;
    tracing::info!(
        embedding_model = embedder.model_name(),
        llm_model = completer.model_name(),
        "providers configured"
    );

    let store = FsDocumentStore::new(&config.paths.kb_root);
    if !store.root().is_dir() {
        tracing::warn!(
            kb_root = %store.root().display(),
            "knowledge base root is missing; queries will fail until it exists"
        );
    }

    Ok(Engine::new(
        Arc::new(index),
        Arc::new(embedder),
        Arc::new(completer),
        Arc::new(store),
        config.query_params(),
    ))
}
