//! In-memory forum and embedding doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use piazza_reader::embedding::{EmbeddingError, EmbeddingProvider, Vector};
use piazza_reader::forum::{Course, ForumClient, ForumError, Post};
use piazza_reader::thread::{NodeKind, ThreadNode};

pub fn course(nid: &str) -> Course {
    Course {
        nid: nid.to_string(),
        name: format!("Course {nid}"),
        term: "Fall 2024".to_string(),
    }
}

pub fn post(nr: u64, subject: &str, preview: &str) -> Post {
    Post {
        nr,
        id: format!("id{nr}"),
        subject: subject.to_string(),
        preview: preview.to_string(),
    }
}

/// `count` posts numbered from `count` down to 1, newest first.
pub fn numbered_posts(count: u64) -> Vec<Post> {
    (1..=count)
        .rev()
        .map(|nr| post(nr, &format!("Question {nr}"), "<p>details</p>"))
        .collect()
}

/// Forum serving a fixed post list, counting every call.
pub struct MockForum {
    courses: Vec<Course>,
    posts: Mutex<Vec<Post>>,
    pub page_calls: AtomicUsize,
    pub replies: Mutex<Vec<(u64, String)>>,
    fail_at: Option<usize>,
    failures_left: AtomicUsize,
    cancel_at: Option<(usize, CancellationToken)>,
    delay: Option<Duration>,
    tree: Option<ThreadNode>,
    repeat_pages: AtomicBool,
}

impl MockForum {
    pub fn new(posts: Vec<Post>) -> Self {
        Self {
            courses: vec![course("c1")],
            posts: Mutex::new(posts),
            page_calls: AtomicUsize::new(0),
            replies: Mutex::new(Vec::new()),
            fail_at: None,
            failures_left: AtomicUsize::new(0),
            cancel_at: None,
            delay: None,
            tree: None,
            repeat_pages: AtomicBool::new(false),
        }
    }

    pub fn with_courses(mut self, courses: Vec<Course>) -> Self {
        self.courses = courses;
        self
    }

    /// Fail the page at `offset` the next `times` times it is requested.
    pub fn failing_at(mut self, offset: usize, times: usize) -> Self {
        self.fail_at = Some(offset);
        self.failures_left = AtomicUsize::new(times);
        self
    }

    /// Cancel `token` while serving the page at `offset`.
    pub fn cancelling_at(mut self, offset: usize, token: CancellationToken) -> Self {
        self.cancel_at = Some((offset, token));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_tree(mut self, tree: ThreadNode) -> Self {
        self.tree = Some(tree);
        self
    }

    /// Serve the first page for every offset.
    pub fn repeating(self) -> Self {
        self.repeat_pages.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_posts(&self, posts: Vec<Post>) {
        *self.posts.lock().unwrap() = posts;
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForumClient for MockForum {
    async fn list_courses(&self) -> Result<Vec<Course>, ForumError> {
        Ok(self.courses.clone())
    }

    async fn get_page(
        &self,
        _course: &Course,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, ForumError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((at, token)) = &self.cancel_at {
            if *at == offset {
                token.cancel();
            }
        }
        if self.fail_at == Some(offset)
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(ForumError::Api {
                method: "network.get_my_feed".to_string(),
                message: "rate limited".to_string(),
            });
        }

        let offset = if self.repeat_pages.load(Ordering::SeqCst) {
            0
        } else {
            offset
        };
        let posts = self.posts.lock().unwrap();
        Ok(posts.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn get_post_tree(&self, _course: &Course, nr: u64) -> Result<ThreadNode, ForumError> {
        self.tree.clone().ok_or(ForumError::Api {
            method: "content.get".to_string(),
            message: format!("post {nr} not found"),
        })
    }

    async fn post_reply(&self, _course: &Course, nr: u64, text: &str) -> Result<(), ForumError> {
        self.replies.lock().unwrap().push((nr, text.to_string()));
        Ok(())
    }
}

/// Embeds text as keyword counts over a fixed vocabulary.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
    pub batches: AtomicUsize,
    pub texts: AtomicUsize,
    fail_queries: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: Vec<&'static str>) -> Self {
        Self {
            vocabulary,
            batches: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
            fail_queries: AtomicBool::new(false),
        }
    }

    /// Make every request fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.fail_queries.store(failing, Ordering::SeqCst);
    }

    pub fn texts_encoded(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vector>, EmbeddingError> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(EmbeddingError::InvalidResponse("backend down".to_string()));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                self.vocabulary
                    .iter()
                    .map(|word| text.matches(word).count() as f32)
                    .collect()
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keyword-counts"
    }
}

pub fn thread_root(subject: &str, children: Vec<ThreadNode>) -> ThreadNode {
    ThreadNode::new(NodeKind::OriginalPost, subject, "").with_children(children)
}
