//! Collaborator interfaces consumed by the core.
//!
//! The application crate implements these over HTTP and the filesystem;
//! tests implement them with scripted fakes. Every method returns an explicit
//! `Result` so each call site decides between failing the query and falling
//! back.

use async_trait::async_trait;

use crate::error::{FetchError, ServiceError};

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of texts. The output has one vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::InvalidResponse("empty embedding response".into()))
    }
}

/// Sampling controls and prompts for one completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the service to return a JSON object.
    pub json_mode: bool,
}

impl CompletionRequest {
    /// A deterministic JSON-mode request, as used for tag, paraphrase and
    /// ordering calls.
    pub fn json(system: impl Into<String>, user: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            max_tokens,
            json_mode: true,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Chat-style text generation.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

/// Read access to full document bodies, addressed by index path.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<String, FetchError>;
}
