//! OpenAI-compatible embedding provider.
//!
//! Calls `POST {base_url}/embeddings` with `{model, input}` and returns the
//! `data[].embedding` arrays in input order. Inputs larger than
//! `batch_size` are split across several requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kb_answer_core::error::ServiceError;
use kb_answer_core::services::EmbeddingService;

use crate::client::{build_client, endpoint, post_json};
use crate::config::{resolve_api_key, EmbeddingConfig};

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// Fails when `api_key_env` names a variable that is not set.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: endpoint(&config.base_url, "embeddings"),
            model: config.model.clone(),
            api_key: resolve_api_key(config.api_key_env.as_deref())?,
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[async_trait]
impl EmbeddingService for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = EmbeddingRequest {
                model: &self.model,
                input: batch,
            };
            let response: EmbeddingResponse = post_json(
                &self.client,
                &self.url,
                self.api_key.as_deref(),
                &body,
                self.max_retries,
            )
            .await?;
            out.extend(into_ordered(response, batch.len())?);
        }
        Ok(out)
    }
}

/// Order vectors by `data[].index` when every item carries one, and check the count.
fn into_ordered(
    response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, ServiceError> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(ServiceError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }
    if data.iter().all(|d| d.index.is_some()) {
        data.sort_by_key(|d| d.index);
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}
