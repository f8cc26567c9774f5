//! In-memory cache of course feeds and their embedding vectors.
//!
//! One entry per course, stored behind an `Arc` so readers of a fresh entry
//! never wait on a writer. Writers serialize per course through a lazily
//! created async mutex; different courses never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::embedding::Vector;
use crate::fetcher::{FetchInterruption, PageFetcher};
use crate::forum::{Course, Post};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Vectors aligned with a post list; `None` marks a post with no searchable text.
pub type PostVectors = Vec<Option<Vector>>;

/// Cached feed of one course.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub posts: Arc<[Post]>,
    /// When present, `vectors.len() == posts.len()`.
    pub vectors: Option<Arc<PostVectors>>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    /// Whether the entry is still inside the expiry window at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: Instant, expiry: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < expiry
    }

    /// Cached vectors, if they still line up with the posts.
    #[must_use]
    pub fn usable_vectors(&self) -> Option<&Arc<PostVectors>> {
        self.vectors
            .as_ref()
            .filter(|vectors| vectors.len() == self.posts.len())
    }
}

/// Result of [`PostCache::get_or_fetch`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub entry: Arc<CacheEntry>,
    /// Served from cache without touching the forum.
    pub hit: bool,
    /// Set when the feed walk stopped early. Such results are not cached.
    pub interruption: Option<FetchInterruption>,
}

/// Process-wide store of course feeds with a fixed expiry window.
pub struct PostCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
    write_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl PostCache {
    #[must_use]
    pub fn new(expiry: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            write_locks: Mutex::new(HashMap::new()),
            expiry,
            clock,
        }
    }

    #[must_use]
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Current entry for a course, fresh or not.
    #[must_use]
    pub fn peek(&self, course: &Course) -> Option<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&course.nid)
            .cloned()
    }

    fn fresh_entry(&self, nid: &str) -> Option<Arc<CacheEntry>> {
        let now = self.clock.now();
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(nid)
            .filter(|entry| entry.is_fresh(now, self.expiry))
            .cloned()
    }

    fn write_lock(&self, nid: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(nid.to_string()).or_default())
    }

    fn store(&self, nid: &str, entry: Arc<CacheEntry>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(nid.to_string(), entry);
    }

    /// Seed a fresh entry directly, bypassing the feed walk.
    #[cfg(test)]
    pub(crate) fn insert_entry(
        &self,
        course: &Course,
        posts: Vec<Post>,
        vectors: Option<PostVectors>,
    ) {
        let entry = CacheEntry {
            posts: posts.into(),
            vectors: vectors.map(Arc::new),
            fetched_at: self.clock.now(),
        };
        self.store(&course.nid, Arc::new(entry));
    }

    /// Return the fresh entry for a course, walking the feed if there is none.
    pub async fn get_or_fetch(&self, course: &Course, fetcher: &PageFetcher) -> CacheLookup {
        self.get_or_fetch_cancellable(course, fetcher, &CancellationToken::new())
            .await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), with a feed walk that can be
    /// cancelled between pages.
    pub async fn get_or_fetch_cancellable(
        &self,
        course: &Course,
        fetcher: &PageFetcher,
        cancel: &CancellationToken,
    ) -> CacheLookup {
        if let Some(entry) = self.fresh_entry(&course.nid) {
            debug!(course = %course.nid, posts = entry.posts.len(), "Post cache hit");
            return CacheLookup {
                entry,
                hit: true,
                interruption: None,
            };
        }

        let lock = self.write_lock(&course.nid);
        let _guard = lock.lock().await;

        // Another task may have refreshed the entry while we waited.
        if let Some(entry) = self.fresh_entry(&course.nid) {
            debug!(course = %course.nid, "Post cache filled by concurrent fetch");
            return CacheLookup {
                entry,
                hit: true,
                interruption: None,
            };
        }

        let outcome = fetcher.fetch_all_cancellable(course, cancel).await;
        let entry = Arc::new(CacheEntry {
            posts: outcome.posts.into(),
            vectors: None,
            fetched_at: self.clock.now(),
        });

        if outcome.interruption.is_none() {
            self.store(&course.nid, Arc::clone(&entry));
            info!(course = %course.nid, posts = entry.posts.len(), "Post cache refreshed");
        } else {
            warn!(
                course = %course.nid,
                posts = entry.posts.len(),
                "Feed walk incomplete, result not cached"
            );
        }

        CacheLookup {
            entry,
            hit: false,
            interruption: outcome.interruption,
        }
    }

    /// Add or replace the vectors of the course's current entry.
    ///
    /// Keeps `fetched_at`. Returns `false` and leaves the entry untouched when
    /// there is no entry or the vector count differs from the post count.
    pub async fn attach_vectors(&self, course: &Course, vectors: PostVectors) -> bool {
        self.attach(course, None, vectors).await
    }

    /// Like [`attach_vectors`](Self::attach_vectors), but only if the entry
    /// still holds the same post list as `expected` (no refetch in between).
    pub async fn attach_vectors_to(
        &self,
        course: &Course,
        expected: &CacheEntry,
        vectors: PostVectors,
    ) -> bool {
        self.attach(course, Some(expected), vectors).await
    }

    async fn attach(
        &self,
        course: &Course,
        expected: Option<&CacheEntry>,
        vectors: PostVectors,
    ) -> bool {
        let lock = self.write_lock(&course.nid);
        let _guard = lock.lock().await;

        let Some(current) = self.peek(course) else {
            debug!(course = %course.nid, "No cache entry to attach vectors to");
            return false;
        };
        if let Some(expected) = expected {
            if !Arc::ptr_eq(&current.posts, &expected.posts) {
                debug!(course = %course.nid, "Cache entry replaced since vectors were computed");
                return false;
            }
        }
        if vectors.len() != current.posts.len() {
            warn!(
                course = %course.nid,
                vectors = vectors.len(),
                posts = current.posts.len(),
                "Vector count does not match post count, not attaching"
            );
            return false;
        }

        self.store(
            &course.nid,
            Arc::new(CacheEntry {
                posts: Arc::clone(&current.posts),
                vectors: Some(Arc::new(vectors)),
                fetched_at: current.fetched_at,
            }),
        );
        true
    }

    /// Drop a course's entry so the next lookup refetches it.
    pub async fn invalidate(&self, course: &Course) {
        let lock = self.write_lock(&course.nid);
        let _guard = lock.lock().await;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&course.nid);
        debug!(course = %course.nid, "Post cache entry invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(nr: u64) -> Post {
        Post {
            nr,
            id: format!("id{nr}"),
            subject: format!("post {nr}"),
            preview: String::new(),
        }
    }

    #[test]
    fn test_entry_freshness() {
        let clock = ManualClock::new();
        let entry = CacheEntry {
            posts: vec![post(1)].into(),
            vectors: None,
            fetched_at: clock.now(),
        };
        let expiry = Duration::from_secs(60);

        assert!(entry.is_fresh(clock.now(), expiry));
        clock.advance(Duration::from_secs(59));
        assert!(entry.is_fresh(clock.now(), expiry));
        clock.advance(Duration::from_secs(1));
        assert!(!entry.is_fresh(clock.now(), expiry));
    }

    #[test]
    fn test_mismatched_vectors_are_unusable() {
        let entry = CacheEntry {
            posts: vec![post(1), post(2)].into(),
            vectors: Some(Arc::new(vec![Some(vec![1.0])])),
            fetched_at: Instant::now(),
        };
        assert!(entry.usable_vectors().is_none());

        let aligned = CacheEntry {
            vectors: Some(Arc::new(vec![Some(vec![1.0]), None])),
            ..entry
        };
        assert_eq!(aligned.usable_vectors().map(|v| v.len()), Some(2));
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - start, Duration::from_secs(5));
    }
}
