//! Ranked search over a course's posts.
//!
//! Semantic ranking is used whenever the embedding index is available;
//! otherwise, or when encoding fails for this call, posts are matched by
//! case-insensitive substring. The two modes are never blended.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, PostCache, PostVectors};
use crate::constants::SEARCH_TEXT_SEPARATOR;
use crate::embedding::{EmbeddingError, EmbeddingIndex};
use crate::fetcher::{FetchInterruption, PageFetcher};
use crate::forum::{Course, Post};
use crate::text::HtmlToText;

/// How a result list was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Ranked by embedding similarity, best first.
    Semantic,
    /// Substring matches in feed order.
    Keyword,
    /// Nothing was searched: empty query or no posts.
    Skipped,
    /// The caller cancelled before ranking.
    Cancelled,
}

/// A condition the engine recovered from while answering a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// The feed walk stopped early; results cover only the posts fetched.
    FetchPartial(FetchInterruption),
    /// No embedding provider for this process; keyword search was used.
    EmbeddingUnavailable,
    /// Encoding failed for this query only; keyword search was used.
    EmbeddingEncodeFailure(String),
    /// Cached vectors no longer lined up with the posts and were recomputed.
    CacheSizeMismatch,
}

/// Result of [`QueryEngine::search`].
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub posts: Vec<Post>,
    pub mode: SearchMode,
    pub degradations: Vec<Degradation>,
    /// Posts came from the cache without a feed walk.
    pub cache_hit: bool,
}

impl SearchOutcome {
    fn skipped() -> Self {
        Self {
            posts: Vec::new(),
            mode: SearchMode::Skipped,
            degradations: Vec::new(),
            cache_hit: false,
        }
    }

    /// Whether results may be missing because the feed walk stopped early.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.degradations
            .iter()
            .any(|d| matches!(d, Degradation::FetchPartial(_)))
    }
}

/// Searches course posts through the shared cache and embedding index.
#[derive(Clone)]
pub struct QueryEngine {
    cache: Arc<PostCache>,
    index: Arc<EmbeddingIndex>,
    fetcher: PageFetcher,
    text: Arc<dyn HtmlToText>,
    top_k: usize,
}

impl QueryEngine {
    #[must_use]
    pub fn new(
        cache: Arc<PostCache>,
        index: Arc<EmbeddingIndex>,
        fetcher: PageFetcher,
        text: Arc<dyn HtmlToText>,
        top_k: usize,
    ) -> Self {
        Self {
            cache,
            index,
            fetcher,
            text,
            top_k: top_k.max(1),
        }
    }

    /// Search a course, best results first.
    pub async fn search(&self, query: &str, course: &Course) -> SearchOutcome {
        self.search_cancellable(query, course, &CancellationToken::new())
            .await
    }

    /// Like [`search`](Self::search); `cancel` is honoured between feed pages
    /// and before embedding starts.
    pub async fn search_cancellable(
        &self,
        query: &str,
        course: &Course,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        if query.trim().is_empty() {
            return SearchOutcome::skipped();
        }

        let lookup = self
            .cache
            .get_or_fetch_cancellable(course, &self.fetcher, cancel)
            .await;

        let mut outcome = SearchOutcome::skipped();
        outcome.cache_hit = lookup.hit;
        if let Some(interruption) = lookup.interruption {
            outcome.degradations.push(Degradation::FetchPartial(interruption));
        }

        if cancel.is_cancelled() {
            outcome.mode = SearchMode::Cancelled;
            return outcome;
        }
        if lookup.entry.posts.is_empty() {
            debug!(course = %course.nid, "No posts to search");
            return outcome;
        }

        let entry = lookup.entry;
        if self.index.is_available().await {
            match self.semantic(query, course, &entry, cancel, &mut outcome).await {
                Ok(Some(posts)) => {
                    outcome.posts = posts;
                    outcome.mode = SearchMode::Semantic;
                }
                Ok(None) => {
                    debug!(course = %course.nid, "Search cancelled before embedding posts");
                    outcome.mode = SearchMode::Cancelled;
                    return outcome;
                }
                Err(e) => {
                    warn!(course = %course.nid, "Semantic search failed, using keyword search: {e}");
                    outcome
                        .degradations
                        .push(Degradation::EmbeddingEncodeFailure(e.to_string()));
                    outcome.posts = self.keyword(query, &entry.posts);
                    outcome.mode = SearchMode::Keyword;
                }
            }
        } else {
            outcome.degradations.push(Degradation::EmbeddingUnavailable);
            outcome.posts = self.keyword(query, &entry.posts);
            outcome.mode = SearchMode::Keyword;
        }

        info!(
            course = %course.nid,
            mode = ?outcome.mode,
            results = outcome.posts.len(),
            cache_hit = outcome.cache_hit,
            "Search finished"
        );
        outcome
    }

    /// Text a post is matched or embedded by: subject, separator, plain preview.
    fn search_text(&self, post: &Post) -> String {
        let preview = self.text.html_to_plain(&post.preview);
        format!("{}{SEARCH_TEXT_SEPARATOR}{}", post.subject.trim(), preview.trim())
    }

    /// Posts whose subject or preview contains `query`, ignoring case, in feed order.
    #[must_use]
    pub fn keyword(&self, query: &str, posts: &[Post]) -> Vec<Post> {
        let needle = query.to_lowercase();
        posts
            .iter()
            .filter(|post| {
                let preview = self.text.html_to_plain(&post.preview);
                format!("{} {}", post.subject, preview)
                    .to_lowercase()
                    .contains(&needle)
            })
            .cloned()
            .collect()
    }

    async fn semantic(
        &self,
        query: &str,
        course: &Course,
        entry: &CacheEntry,
        cancel: &CancellationToken,
        outcome: &mut SearchOutcome,
    ) -> Result<Option<Vec<Post>>, EmbeddingError> {
        let query_vector = self
            .index
            .encode(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                got: 0,
            })?;

        let computed;
        let vectors: &PostVectors = if let Some(cached) = entry.usable_vectors() {
            debug!(course = %course.nid, "Reusing cached post vectors");
            cached.as_ref()
        } else {
            if entry.vectors.is_some() {
                debug!(course = %course.nid, "Cached vectors out of date, recomputing");
                outcome.degradations.push(Degradation::CacheSizeMismatch);
            }
            if cancel.is_cancelled() {
                return Ok(None);
            }
            computed = self.embed_posts(&entry.posts).await?;
            &computed
        };

        let candidates: Vec<(usize, &[f32])> = vectors
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_deref().map(|v| (i, v)))
            .collect();
        let candidate_vectors: Vec<&[f32]> = candidates.iter().map(|(_, v)| *v).collect();

        let ranked = self.index.rank(&query_vector, &candidate_vectors, self.top_k);
        let posts = ranked
            .into_iter()
            .map(|(candidate, _score)| entry.posts[candidates[candidate].0].clone())
            .collect();

        if entry.usable_vectors().is_none() {
            let attached = self
                .cache
                .attach_vectors_to(course, entry, vectors.clone())
                .await;
            debug!(course = %course.nid, attached, "Stored post vectors");
        }

        Ok(Some(posts))
    }

    /// Embed every post with searchable text, keeping `None` slots for the rest.
    async fn embed_posts(
        &self,
        posts: &[Post],
    ) -> Result<PostVectors, EmbeddingError> {
        let mut slots = Vec::new();
        let mut texts = Vec::new();
        for (i, post) in posts.iter().enumerate() {
            let text = self.search_text(post);
            if !text.trim().is_empty() {
                slots.push(i);
                texts.push(text);
            }
        }

        let encoded = self.index.encode(&texts).await?;
        let mut vectors: PostVectors = vec![None; posts.len()];
        for (slot, vector) in slots.into_iter().zip(encoded) {
            vectors[slot] = Some(vector);
        }

        info!(posts = posts.len(), embedded = texts.len(), "Embedded course posts");
        Ok(vectors)
    }
}
