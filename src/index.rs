//! In-memory embedding index: exact nearest-neighbour search over the chunks
//! of a single document.
//!
//! Indexes are built per document and are immutable once built. The build
//! embeds every chunk in one batch and enforces a uniform vector dimension;
//! queries score all vectors and return the `k` closest. For the document
//! sizes this service handles, an exhaustive scan beats approximate
//! structures on both simplicity and recall.

use std::collections::VecDeque;
use std::hash::Hasher;
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHasher};
use thiserror::Error;
use tracing::warn;

use crate::backends::{BackendError, EmbeddingBackend, TokenUsage};
use crate::chunker::Chunk;

/// How query/chunk vector distance is computed. Lower is closer under both
/// metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`. Magnitude-insensitive, the usual choice for text
    /// embeddings.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_a = 0.0f32;
                let mut norm_b = 0.0f32;
                for (x, y) in a.iter().zip(b) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                let norms = norm_a.sqrt() * norm_b.sqrt();
                // A zero vector has no direction; treat it as orthogonal to
                // everything rather than dividing by zero.
                if norms == 0.0 {
                    1.0
                } else {
                    1.0 - dot / norms
                }
            }
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("cannot build an index over zero chunks")]
    Empty,
    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Immutable per-document index. `vectors[i]` embeds `chunks[i]`, and chunks
/// are stored in their original document order.
#[derive(Debug)]
pub struct EmbeddingIndex {
    metric: DistanceMetric,
    dimension: usize,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Dimension every stored (and queried) vector must have.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the `k` chunks closest to `query`, nearest first. Ties score
    /// by position, so equally-distant chunks come back in document order.
    /// Fewer than `k` hits come back when the index is smaller than `k`.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<(&Chunk, f32)>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                found: query.len(),
            });
        }
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .map(|vector| self.metric.distance(query, vector))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(i, distance)| (&self.chunks[i], distance))
            .collect())
    }
}

/// Builds [`EmbeddingIndex`]es by batch-embedding chunk texts.
pub struct EmbeddingIndexer {
    embedder: Arc<dyn EmbeddingBackend>,
    metric: DistanceMetric,
}

impl EmbeddingIndexer {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, metric: DistanceMetric) -> Self {
        Self { embedder, metric }
    }

    /// Embeds every chunk and assembles the index. The whole build fails if
    /// any chunk fails to embed or if the provider returns vectors of uneven
    /// dimension.
    pub async fn build(
        &self,
        chunks: Vec<Chunk>,
    ) -> Result<(EmbeddingIndex, TokenUsage), IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.vectors.len() != chunks.len() {
            return Err(IndexError::Backend(BackendError::MalformedResponse(
                format!(
                    "provider returned {} vectors for {} chunks",
                    embeddings.vectors.len(),
                    chunks.len()
                ),
            )));
        }

        let dimension = embeddings.vectors[0].len();
        for vector in &embeddings.vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    found: vector.len(),
                });
            }
        }
        Ok((
            EmbeddingIndex {
                metric: self.metric,
                dimension,
                chunks,
                vectors: embeddings.vectors,
            },
            embeddings.usage,
        ))
    }
}

/// Cache key: the document's storage URI plus a fingerprint of its bytes, so
/// a re-uploaded file with the same name never serves a stale index.
pub type IndexKey = (String, u64);

/// Hashes document bytes into the fingerprint half of an [`IndexKey`].
pub fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

struct CacheInner {
    entries: FxHashMap<IndexKey, Arc<EmbeddingIndex>>,
    order: VecDeque<IndexKey>,
}

/// Bounded cache of built indexes, keyed by document identity.
///
/// Eviction is oldest-insertion-first. A capacity of zero disables caching
/// entirely: `get` always misses and `insert` is a no-op. The lock is only
/// held for map operations, never across an await.
pub struct IndexCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl IndexCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: FxHashMap::default(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn get(&self, key: &IndexKey) -> Option<Arc<EmbeddingIndex>> {
        if self.capacity == 0 {
            return None;
        }
        let inner = self.inner.lock().expect("index cache mutex poisoned");
        inner.entries.get(key).cloned()
    }

    pub fn insert(&self, key: IndexKey, index: Arc<EmbeddingIndex>) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().expect("index cache mutex poisoned");
        if inner.entries.insert(key.clone(), index).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                warn!(uri = %oldest.0, "index cache full, evicting oldest entry");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("index cache mutex poisoned")
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
