#![allow(dead_code)]

use std::sync::Arc;

use docparley::chunker::Chunker;
use docparley::engine::{AnsweringEngine, ChatTurnRequest, EngineSettings};
use docparley::index::{DistanceMetric, EmbeddingIndexer};
use docparley::retriever::Retriever;
use docparley::storage::{FsObjectStore, ObjectKey, ObjectStore};
use docparley::stores::SqliteConversationStore;

use super::backends::{HashEmbedder, ScriptedGenerator};

/// A full engine wired to in-process mocks and temp-dir persistence.
pub struct Harness {
    pub engine: AnsweringEngine,
    pub store: Arc<SqliteConversationStore>,
    pub objects: Arc<FsObjectStore>,
    pub embedder: Arc<HashEmbedder>,
    pub generator: Arc<ScriptedGenerator>,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// Scripted generator answers are consumed in order; once exhausted the
    /// generator answers "I don't know.".
    pub async fn with_answers(answers: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteConversationStore::connect(&format!(
                "sqlite://{}",
                dir.path().join("chat.db").display()
            ))
            .await
            .unwrap(),
        );
        let objects = Arc::new(FsObjectStore::new(dir.path().join("objects")).await.unwrap());
        let embedder = Arc::new(HashEmbedder::new());
        let generator = Arc::new(ScriptedGenerator::with_answers(answers));

        let engine = AnsweringEngine::new(
            store.clone(),
            objects.clone(),
            EmbeddingIndexer::new(embedder.clone(), DistanceMetric::Cosine),
            Retriever::new(embedder.clone(), 4),
            generator.clone(),
            Chunker::new(1000, 100).unwrap(),
            EngineSettings::default(),
        );

        Self {
            engine,
            store,
            objects,
            embedder,
            generator,
            _dir: dir,
        }
    }

    /// Stores a document the way `/uploadFile` would and returns its URI.
    pub async fn upload(&self, filename: &str, bytes: &[u8]) -> String {
        self.objects
            .put(&ObjectKey::new("docparley", "documents", filename), bytes)
            .await
            .unwrap()
    }
}

pub fn chat_request(
    session_id: Option<&str>,
    user_input: &str,
    data_source: &str,
) -> ChatTurnRequest {
    ChatTurnRequest {
        session_id: session_id.map(ToString::to_string),
        user_input: user_input.to_string(),
        data_source: data_source.to_string(),
    }
}
