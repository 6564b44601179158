//! OpenAI-compatible chat completion provider.
//!
//! Calls `POST {base_url}/chat/completions` with a system and a user message.
//! JSON-mode requests set `response_format = {"type": "json_object"}`; the
//! core still parses the reply defensively since not every server honours it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use kb_answer_core::error::ServiceError;
use kb_answer_core::services::{CompletionRequest, CompletionService};

use crate::client::{build_client, endpoint, post_json};
use crate::config::{resolve_api_key, LlmConfig};

pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            url: endpoint(&config.base_url, "chat/completions"),
            model: config.model.clone(),
            api_key: resolve_api_key(config.api_key_env.as_deref())?,
            max_retries: config.max_retries,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_request<'a>(model: &'a str, request: &'a CompletionRequest) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: [
            ChatMessage {
                role: "system",
                content: &request.system,
            },
            ChatMessage {
                role: "user",
                content: &request.user,
            },
        ],
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        response_format: request.json_mode.then_some(ResponseFormat {
            kind: "json_object",
        }),
    }
}

/// `choices[0].message.content`; a null content is an empty reply.
fn first_content(response: ChatResponse) -> Result<String, ServiceError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| ServiceError::InvalidResponse("completion has no choices".into()))
}

#[async_trait]
impl CompletionService for OpenAiChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let body = chat_request(&self.model, request);
        let response: ChatResponse = post_json(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
        )
        .await?;
        first_content(response)
    }
}
