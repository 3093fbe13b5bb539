//! OpenAI-compatible HTTP backend for embeddings and chat completions.
//!
//! Works against the official API or any server that speaks the same wire
//! format; the base URL is configurable so tests can point it at a local
//! mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::message::Message;

use super::{BackendError, Completion, EmbeddingBackend, Embeddings, GenerativeBackend, TokenUsage};

/// Per-1k-token prices used to derive [`TokenUsage::total_cost`]. Defaults to
/// zero, which reports cost-free usage.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModelPricing {
    pub prompt_cost_per_1k: f64,
    pub completion_cost_per_1k: f64,
}

impl ModelPricing {
    fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.prompt_cost_per_1k
            + (completion_tokens as f64 / 1000.0) * self.completion_cost_per_1k
    }
}

/// Client for one OpenAI-compatible endpoint, holding the model names used
/// for embedding and generation.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
    pricing: ModelPricing,
}

impl OpenAiBackend {
    /// Creates a client against `base_url` (e.g. `https://api.openai.com/v1`,
    /// no trailing slash). Generation runs at temperature zero so answers
    /// stay anchored to the retrieved context.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        chat_model: impl Into<String>,
        embedding_model: impl Into<String>,
        pricing: ModelPricing,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: chat_model.into(),
            embedding_model: embedding_model.into(),
            temperature: 0.0,
            pricing,
        }
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, BackendError>
    where
        Req: Serialize,
        Resp: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }

    fn usage_from(&self, api: ApiUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: api.prompt_tokens,
            completion_tokens: api.completion_tokens,
            total_tokens: api.total_tokens,
            total_cost: self.pricing.cost(api.prompt_tokens, api.completion_tokens),
        }
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
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

/// Providers omit the usage block in some modes, so every field defaults.
#[derive(Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    async fn embed(&self, texts: &[String]) -> Result<Embeddings, BackendError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let mut response: EmbeddingResponse = self.post_json("/embeddings", &request).await?;
        if response.data.len() != texts.len() {
            return Err(BackendError::MalformedResponse(format!(
                "asked for {} embeddings, provider returned {}",
                texts.len(),
                response.data.len()
            )));
        }
        // The API is allowed to return data out of order; `index` is the
        // position of the input each vector belongs to.
        response.data.sort_by_key(|datum| datum.index);
        let usage = self.usage_from(response.usage);
        Ok(Embeddings {
            vectors: response.data.into_iter().map(|d| d.embedding).collect(),
            usage,
        })
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, BackendError> {
        let request = ChatRequest {
            model: &self.chat_model,
            messages,
            temperature: self.temperature,
        };
        let response: ChatResponse = self.post_json("/chat/completions", &request).await?;
        let usage = self.usage_from(response.usage);
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::MalformedResponse("no choices in response".into()))?;
        Ok(Completion {
            text: choice.message.content,
            usage,
        })
    }
}
