//! Model backends: the embedding and generation seams of the pipeline.
//!
//! The answering engine only ever talks to [`EmbeddingBackend`] and
//! [`GenerativeBackend`]; the OpenAI-compatible HTTP client in
//! [`openai`](crate::backends::openai) is the production implementation, and
//! tests substitute deterministic in-process fakes.

pub mod openai;

use std::ops::AddAssign;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

pub use openai::{ModelPricing, OpenAiBackend};

/// Token counts and derived cost for one or more model calls.
///
/// Usage is additive: every stage of a chat turn that touches a model folds
/// its own usage into the running total reported back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Cost in the billing currency of the configured pricing table. Zero
    /// when no pricing is configured.
    pub total_cost: f64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.total_cost += other.total_cost;
    }
}

/// Result of embedding a batch of texts. `vectors[i]` corresponds to the
/// i-th input text.
#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub usage: TokenUsage,
}

/// Result of a single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Failures talking to a model provider. These surface to clients as
/// upstream-dependency errors, never as bugs in this service.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request to model provider failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Turns a batch of texts into one embedding vector per text.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Embeddings, BackendError>;
}

/// Produces a completion for a chat-shaped prompt.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_across_stages() {
        let mut total = TokenUsage::default();
        total += TokenUsage {
            prompt_tokens: 120,
            completion_tokens: 0,
            total_tokens: 120,
            total_cost: 0.012,
        };
        total += TokenUsage {
            prompt_tokens: 300,
            completion_tokens: 45,
            total_tokens: 345,
            total_cost: 0.069,
        };
        assert_eq!(total.prompt_tokens, 420);
        assert_eq!(total.completion_tokens, 45);
        assert_eq!(total.total_tokens, 465);
        assert!((total.total_cost - 0.081).abs() < 1e-9);
    }

    #[test]
    fn usage_serializes_flat() {
        let usage = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
            total_cost: 0.0,
        };
        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["prompt_tokens"], 10);
        assert_eq!(json["total_tokens"], 15);
    }
}
