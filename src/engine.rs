//! The answering engine: one chat turn, start to finish.
//!
//! A turn moves through a fixed sequence of stages:
//!
//! ```text
//! received -> history_loaded -> document_ready -> indexed
//!     -> query_contextualized -> retrieved -> generated -> persisted -> done
//! ```
//!
//! Any stage can fail; the failure carries the stage it happened in plus the
//! classified [`ServiceError`], and nothing after the failed stage runs. In
//! particular a turn that fails before `persisted` leaves no trace in the
//! conversation store.

use std::sync::Arc;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::backends::{GenerativeBackend, TokenUsage};
use crate::chunker::{Chunk, Chunker};
use crate::errors::ServiceError;
use crate::extract::extract_text;
use crate::index::{EmbeddingIndexer, IndexCache, fingerprint};
use crate::message::Message;
use crate::retriever::Retriever;
use crate::storage::ObjectStore;
use crate::stores::{ConversationStore, Turn};

/// Stages of a chat turn, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    HistoryLoaded,
    DocumentReady,
    Indexed,
    QueryContextualized,
    Retrieved,
    Generated,
    Persisted,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::HistoryLoaded => "history_loaded",
            Self::DocumentReady => "document_ready",
            Self::Indexed => "indexed",
            Self::QueryContextualized => "query_contextualized",
            Self::Retrieved => "retrieved",
            Self::Generated => "generated",
            Self::Persisted => "persisted",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// A [`ServiceError`] tagged with the stage that raised it.
#[derive(Debug, Error, Diagnostic)]
#[error("chat turn failed during {stage}")]
pub struct EngineError {
    pub stage: Stage,
    #[source]
    #[diagnostic_source]
    pub source: ServiceError,
}

fn fail<E: Into<ServiceError>>(stage: Stage) -> impl FnOnce(E) -> EngineError {
    move |err| EngineError {
        stage,
        source: err.into(),
    }
}

/// Incoming chat payload. `session_id` is optional; turns without one start
/// a fresh session.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurnRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub user_input: String,
    pub data_source: String,
}

impl ChatTurnRequest {
    /// Rejects payloads that cannot possibly produce an answer, before any
    /// external call is made.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.user_input.trim().is_empty() {
            return Err(ServiceError::validation("user_input must not be empty"));
        }
        if self.data_source.trim().is_empty() {
            return Err(ServiceError::validation("data_source must not be empty"));
        }
        Ok(())
    }

    /// The session to continue, if the client named a usable one. Empty and
    /// blank identifiers count as absent.
    fn requested_session(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// What a completed turn hands back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct ChatTurnOutcome {
    pub session_id: String,
    pub answer: String,
    pub usage: TokenUsage,
}

/// Tunables that are not owned by a collaborator.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Number of most-recent turns fed to question condensation. Older
    /// turns stay persisted but no longer influence rewriting.
    pub history_window: usize,
    /// Capacity of the per-document index cache; zero disables it.
    pub index_cache_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            index_cache_capacity: 4,
        }
    }
}

/// Orchestrates store, storage, indexer, retriever and generator into the
/// chat-turn state machine.
pub struct AnsweringEngine {
    store: Arc<dyn ConversationStore>,
    objects: Arc<dyn ObjectStore>,
    indexer: EmbeddingIndexer,
    retriever: Retriever,
    generator: Arc<dyn GenerativeBackend>,
    chunker: Chunker,
    history_window: usize,
    cache: IndexCache,
}

impl AnsweringEngine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        objects: Arc<dyn ObjectStore>,
        indexer: EmbeddingIndexer,
        retriever: Retriever,
        generator: Arc<dyn GenerativeBackend>,
        chunker: Chunker,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            objects,
            indexer,
            retriever,
            generator,
            chunker,
            history_window: settings.history_window,
            cache: IndexCache::new(settings.index_cache_capacity),
        }
    }

    /// Runs one full chat turn and returns the answer with its session and
    /// accumulated token usage. Failures are reported to the caller, which
    /// owns the terminal error log.
    #[instrument(skip(self, request))]
    pub async fn chat(&self, request: ChatTurnRequest) -> Result<ChatTurnOutcome, EngineError> {
        request.validate().map_err(fail(Stage::Received))?;
        let session_id = match request.requested_session() {
            Some(id) => id.to_string(),
            None => {
                let minted = Uuid::new_v4().to_string();
                debug!(session_id = %minted, "minted new session");
                minted
            }
        };
        let mut usage = TokenUsage::default();

        let history = self
            .store
            .load(&session_id)
            .await
            .map_err(fail(Stage::HistoryLoaded))?;

        let bytes = self
            .objects
            .get(&request.data_source)
            .await
            .map_err(fail(Stage::DocumentReady))?;

        // Index identity is (uri, content fingerprint): re-uploading different
        // bytes under the same name always rebuilds.
        let key = (request.data_source.clone(), fingerprint(&bytes));
        let index = match self.cache.get(&key) {
            Some(index) => {
                debug!(data_source = %request.data_source, "reusing cached index");
                index
            }
            None => {
                let filename = request
                    .data_source
                    .rsplit('/')
                    .next()
                    .unwrap_or(&request.data_source);
                let text =
                    extract_text(filename, &bytes).map_err(fail(Stage::DocumentReady))?;
                let chunks = self.chunker.split(&request.data_source, &text);
                let (index, build_usage) = self
                    .indexer
                    .build(chunks)
                    .await
                    .map_err(fail(Stage::Indexed))?;
                usage += build_usage;
                let index = Arc::new(index);
                self.cache.insert(key, Arc::clone(&index));
                index
            }
        };

        // With no prior turns the question is already standalone; the
        // condensation call is skipped entirely.
        let recent = window(&history, self.history_window);
        let question = if recent.is_empty() {
            request.user_input.clone()
        } else {
            let prompt = condense_prompt(recent, &request.user_input);
            let completion = self
                .generator
                .complete(&[Message::user(&prompt)])
                .await
                .map_err(fail(Stage::QueryContextualized))?;
            usage += completion.usage;
            completion.text.trim().to_string()
        };

        let (chunks, retrieve_usage) = self
            .retriever
            .retrieve(&index, &question)
            .await
            .map_err(fail(Stage::Retrieved))?;
        usage += retrieve_usage;

        let completion = self
            .generator
            .complete(&[Message::user(&grounded_prompt(&chunks, &question))])
            .await
            .map_err(fail(Stage::Generated))?;
        usage += completion.usage;
        let answer = completion.text.trim().to_string();

        // The stored question is the user's original wording, not the
        // condensed rewrite.
        self.store
            .append(&session_id, Turn::new(&request.user_input, &answer))
            .await
            .map_err(fail(Stage::Persisted))?;

        info!(
            %session_id,
            total_tokens = usage.total_tokens,
            "chat turn complete"
        );
        Ok(ChatTurnOutcome {
            session_id,
            answer,
            usage,
        })
    }
}

fn window(history: &[Turn], n: usize) -> &[Turn] {
    &history[history.len().saturating_sub(n)..]
}

fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

fn condense_prompt(history: &[Turn], question: &str) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the \
         follow up question to be a standalone question, in its original language.\n\n\
         Chat History:\n{}\nFollow Up Input: {}\nStandalone question:",
        transcript(history),
        question
    )
}

fn grounded_prompt(chunks: &[Chunk], question: &str) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, don't try to \
         make up an answer.\n\n{context}\n\nQuestion: {question}\nHelpful Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_rejects_blank_fields() {
        let request = ChatTurnRequest {
            session_id: None,
            user_input: "   ".into(),
            data_source: "file:///doc.pdf".into(),
        };
        assert!(request.validate().is_err());

        let request = ChatTurnRequest {
            session_id: None,
            user_input: "What changed?".into(),
            data_source: String::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn blank_session_ids_count_as_absent() {
        let request = ChatTurnRequest {
            session_id: Some("  ".into()),
            user_input: "q".into(),
            data_source: "d".into(),
        };
        assert_eq!(request.requested_session(), None);

        let request = ChatTurnRequest {
            session_id: Some("abc-123".into()),
            user_input: "q".into(),
            data_source: "d".into(),
        };
        assert_eq!(request.requested_session(), Some("abc-123"));
    }

    #[test]
    fn window_keeps_only_the_most_recent_turns() {
        let history: Vec<Turn> = (0..5)
            .map(|i| Turn::new(format!("q{i}"), format!("a{i}")))
            .collect();
        let recent = window(&history, 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question, "q3");
        assert_eq!(recent[1].question, "q4");

        assert_eq!(window(&history, 10).len(), 5);
        assert!(window(&[], 3).is_empty());
    }

    #[test]
    fn transcript_renders_speaker_turns() {
        let history = vec![
            Turn::new("When does it start?", "On March 1."),
            Turn::new("And end?", "On June 30."),
        ];
        assert_eq!(
            transcript(&history),
            "Human: When does it start?\nAssistant: On March 1.\n\
             Human: And end?\nAssistant: On June 30."
        );
    }

    #[test]
    fn condense_prompt_embeds_history_and_follow_up() {
        let history = vec![Turn::new("What is the effective date?", "March 1, 2024.")];
        let prompt = condense_prompt(&history, "And when does it expire?");
        assert!(prompt.contains("Chat History:\nHuman: What is the effective date?"));
        assert!(prompt.contains("Follow Up Input: And when does it expire?"));
        assert!(prompt.ends_with("Standalone question:"));
    }

    #[test]
    fn grounded_prompt_separates_context_blocks() {
        let chunks = vec![
            Chunk {
                source: "file:///c.pdf".into(),
                ordinal: 0,
                offset: 0,
                text: "Clause one.".into(),
            },
            Chunk {
                source: "file:///c.pdf".into(),
                ordinal: 1,
                offset: 12,
                text: "Clause two.".into(),
            },
        ];
        let prompt = grounded_prompt(&chunks, "What do the clauses say?");
        assert!(prompt.contains("Clause one.\n\nClause two."));
        assert!(prompt.contains("Question: What do the clauses say?"));
        assert!(prompt.ends_with("Helpful Answer:"));
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(Stage::QueryContextualized.to_string(), "query_contextualized");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}
