//! Semantic retrieval: embed a query, search an index, hand back chunks.
//!
//! Scores stay internal to ranking. Downstream prompt assembly only sees the
//! chunk texts, in nearest-first order.

use std::sync::Arc;

use thiserror::Error;

use crate::backends::{BackendError, EmbeddingBackend, TokenUsage};
use crate::chunker::Chunk;
use crate::index::{EmbeddingIndex, IndexError};

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Embeds queries with the same backend the index was built with and returns
/// the `top_k` nearest chunks.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingBackend>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Returns the chunks most relevant to `query`, nearest first, along
    /// with the token usage of embedding the query. Indexes smaller than
    /// `top_k` yield every chunk they have.
    pub async fn retrieve(
        &self,
        index: &EmbeddingIndex,
        query: &str,
    ) -> Result<(Vec<Chunk>, TokenUsage), RetrieverError> {
        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let vector = embeddings.vectors.into_iter().next().ok_or_else(|| {
            BackendError::MalformedResponse("no embedding returned for query".into())
        })?;
        let hits = index.query(&vector, self.top_k)?;
        let chunks = hits.into_iter().map(|(chunk, _)| chunk.clone()).collect();
        Ok((chunks, embeddings.usage))
    }
}
