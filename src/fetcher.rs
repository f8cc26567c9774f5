//! Walks a course feed page by page to assemble its full post list.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::forum::{Course, ForumClient, Post};

/// Why a walk ended before the feed was exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchInterruption {
    /// The page at `offset` failed; everything before it was kept.
    Failed { offset: usize, error: String },
    /// The caller cancelled between pages.
    Cancelled { offset: usize },
}

/// Posts gathered by a walk, plus how the walk ended.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub posts: Vec<Post>,
    pub interruption: Option<FetchInterruption>,
    /// Number of page requests issued.
    pub pages_requested: usize,
}

impl FetchOutcome {
    /// The walk reached the end of the feed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Sequential feed walker over a [`ForumClient`].
#[derive(Clone)]
pub struct PageFetcher {
    client: Arc<dyn ForumClient>,
    page_size: usize,
}

impl PageFetcher {
    #[must_use]
    pub fn new(client: Arc<dyn ForumClient>, page_size: usize) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn client(&self) -> &Arc<dyn ForumClient> {
        &self.client
    }

    /// Fetch every post of the course.
    ///
    /// Never fails: a failing page ends the walk and is reported in
    /// [`FetchOutcome::interruption`] alongside the posts gathered so far.
    pub async fn fetch_all(&self, course: &Course) -> FetchOutcome {
        self.fetch_all_cancellable(course, &CancellationToken::new())
            .await
    }

    /// Like [`fetch_all`](Self::fetch_all), checking `cancel` before each page.
    ///
    /// A page request already in flight is allowed to finish.
    pub async fn fetch_all_cancellable(
        &self,
        course: &Course,
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        let mut seen = HashSet::new();
        let mut offset = 0;

        loop {
            if cancel.is_cancelled() {
                info!(course = %course.nid, offset, "Feed walk cancelled");
                outcome.interruption = Some(FetchInterruption::Cancelled { offset });
                break;
            }

            outcome.pages_requested += 1;
            let page = match self.client.get_page(course, self.page_size, offset).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        course = %course.nid,
                        offset,
                        fetched = outcome.posts.len(),
                        "Feed page failed, keeping partial result: {e}"
                    );
                    outcome.interruption = Some(FetchInterruption::Failed {
                        offset,
                        error: e.to_string(),
                    });
                    break;
                }
            };

            let page_len = page.len();
            let before = outcome.posts.len();
            outcome
                .posts
                .extend(page.into_iter().filter(|post| seen.insert(post.nr)));
            let new_posts = outcome.posts.len() - before;

            debug!(
                course = %course.nid,
                offset,
                page_len,
                new_posts,
                "Fetched feed page"
            );

            if page_len < self.page_size {
                break;
            }
            if new_posts == 0 {
                // A full page with nothing new means the feed is repeating itself.
                warn!(course = %course.nid, offset, "Feed page had no new posts, stopping");
                break;
            }
            offset += self.page_size;
        }

        info!(
            course = %course.nid,
            posts = outcome.posts.len(),
            pages = outcome.pages_requested,
            complete = outcome.is_complete(),
            "Feed walk finished"
        );
        outcome
    }
}
