//! Embedding provider trait and the index the query engine ranks with.
//!
//! The provider is optional. [`EmbeddingIndex`] runs its initializer at most
//! once per process; if that yields no provider the index stays unavailable
//! and search falls back to keyword matching for the rest of the run.

pub mod openai;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub use openai::OpenAiEmbeddings;

/// Fixed-length numeric representation of a text.
pub type Vector = Vec<f32>;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("embedding API returned status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("expected {expected} embeddings, got {got}")]
    CountMismatch { expected: usize, got: usize },

    #[error("no embedding provider is available")]
    Unavailable,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed several texts, returning one vector per input in order.
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vector>, EmbeddingError>;

    /// Similarity of two vectors; higher is closer.
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Largest number of texts sent in one request.
    fn max_batch_size(&self) -> usize {
        64
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm or lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank `vectors` against `query` by `similarity`.
///
/// Returns at most `top_k` `(index, score)` pairs, best first; equal scores
/// keep ascending index order.
pub fn rank_by<V, F>(query: &[f32], vectors: &[V], top_k: usize, similarity: F) -> Vec<(usize, f32)>
where
    V: AsRef<[f32]>,
    F: Fn(&[f32], &[f32]) -> f32,
{
    let mut scored: Vec<(usize, f32)> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let score = similarity(query, v.as_ref());
            (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(top_k);
    scored
}

/// [`rank_by`] with cosine similarity.
#[must_use]
pub fn rank<V: AsRef<[f32]>>(query: &[f32], vectors: &[V], top_k: usize) -> Vec<(usize, f32)> {
    rank_by(query, vectors, top_k, cosine_similarity)
}

type InitFuture =
    Pin<Box<dyn Future<Output = Result<Arc<dyn EmbeddingProvider>, EmbeddingError>> + Send>>;
type Initializer = Box<dyn FnOnce() -> InitFuture + Send>;

/// Optional embedding backend with one-shot initialization.
pub struct EmbeddingIndex {
    provider: OnceCell<Option<Arc<dyn EmbeddingProvider>>>,
    init: Mutex<Option<Initializer>>,
}

impl EmbeddingIndex {
    /// An index that is permanently unavailable.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            provider: OnceCell::new_with(Some(None)),
            init: Mutex::new(None),
        }
    }

    /// An index backed by an already constructed provider.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: OnceCell::new_with(Some(Some(provider))),
            init: Mutex::new(None),
        }
    }

    /// An index whose provider is built on first use.
    ///
    /// `init` runs at most once; an error leaves the index unavailable.
    pub fn lazy<F, Fut>(init: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Arc<dyn EmbeddingProvider>, EmbeddingError>> + Send + 'static,
    {
        let init: Initializer = Box::new(move || -> InitFuture { Box::pin(init()) });
        Self {
            provider: OnceCell::new(),
            init: Mutex::new(Some(init)),
        }
    }

    async fn provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.provider
            .get_or_init(|| async {
                let init = self
                    .init
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                let Some(init) = init else {
                    return None;
                };
                match init().await {
                    Ok(provider) => {
                        info!(model = provider.model_name(), "Embedding provider ready");
                        Some(provider)
                    }
                    Err(e) => {
                        warn!("Embedding provider unavailable, using keyword search: {e}");
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    /// Whether semantic search can be used. Triggers initialization on first call.
    pub async fn is_available(&self) -> bool {
        self.provider().await.is_some()
    }

    /// Whether initialization has already been attempted.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.provider.initialized()
    }

    /// Encode texts in provider-sized batches.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Unavailable`] without a provider, or the first
    /// batch error. A batch returning the wrong number of vectors is an error.
    pub async fn encode(&self, texts: &[String]) -> Result<Vec<Vector>, EmbeddingError> {
        let provider = self.provider().await.ok_or(EmbeddingError::Unavailable)?;
        let batch_size = provider.max_batch_size().max(1);

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(batch_size) {
            let encoded = provider.encode_batch(batch).await?;
            if encoded.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    got: encoded.len(),
                });
            }
            vectors.extend(encoded);
        }

        debug!(texts = texts.len(), "Encoded texts");
        Ok(vectors)
    }

    /// Rank `vectors` against `query` with the provider's similarity.
    ///
    /// Falls back to cosine similarity if called without a provider.
    #[must_use]
    pub fn rank<V: AsRef<[f32]>>(
        &self,
        query: &[f32],
        vectors: &[V],
        top_k: usize,
    ) -> Vec<(usize, f32)> {
        match self.provider.get() {
            Some(Some(provider)) => rank_by(query, vectors, top_k, |a, b| provider.similarity(a, b)),
            _ => rank(query, vectors, top_k),
        }
    }
}
