#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use docparley::backends::{
    BackendError, Completion, EmbeddingBackend, Embeddings, GenerativeBackend, TokenUsage,
};
use docparley::index::fingerprint;
use docparley::message::Message;

/// Deterministic embedder: the same text always maps to the same vector, so
/// a chunk queried with its own text comes back at distance zero. Reports
/// one token per embedded text and counts calls for cache assertions.
#[derive(Debug, Default)]
pub struct HashEmbedder {
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn vector_for(text: &str) -> Vec<f32> {
    let hash = fingerprint(text.as_bytes());
    (0..4)
        .map(|i| ((hash >> (i * 16)) & 0xFFFF) as f32 / 65_535.0 + 0.01)
        .collect()
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Embeddings, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Embeddings {
            vectors: texts.iter().map(|text| vector_for(text)).collect(),
            usage: TokenUsage {
                prompt_tokens: texts.len() as u64,
                completion_tokens: 0,
                total_tokens: texts.len() as u64,
                total_cost: 0.0,
            },
        })
    }
}

/// Generator that records every prompt it receives and replays scripted
/// answers in order. Reports a fixed 110 tokens per completion.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    prompts: Mutex<Vec<String>>,
    answers: Mutex<VecDeque<String>>,
    fail_next: AtomicBool,
}

impl ScriptedGenerator {
    pub fn with_answers(answers: &[&str]) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Every prompt seen so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Makes the next `complete` call fail with an upstream error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedGenerator {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, BackendError> {
        let prompt = messages
            .iter()
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join("\n");
        self.prompts.lock().unwrap().push(prompt);

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 503,
                message: "scripted failure".into(),
            });
        }

        let text = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "I don't know.".to_string());
        Ok(Completion {
            text,
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 10,
                total_tokens: 110,
                total_cost: 0.0,
            },
        })
    }
}
