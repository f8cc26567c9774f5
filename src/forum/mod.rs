//! Forum data model and the client capability the core depends on.

pub mod models;
pub mod piazza;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::thread::ThreadNode;

pub use piazza::PiazzaClient;

/// A class on the forum under which posts are scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    /// Network identifier used by every feed call.
    pub nid: String,
    pub name: String,
    /// Term label such as "Fall 2024".
    #[serde(default)]
    pub term: String,
}

impl Course {
    /// Label shown in menus, e.g. `CS 101 [Fall 2024]`.
    #[must_use]
    pub fn label(&self) -> String {
        if self.term.is_empty() {
            self.name.clone()
        } else {
            format!("{} [{}]", self.name, self.term)
        }
    }
}

/// A top-level discussion item as it appears in the course feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Per-course post number.
    pub nr: u64,
    /// Opaque content identifier.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    /// Preview snippet, possibly HTML.
    #[serde(default)]
    pub preview: String,
}

impl Post {
    /// Label shown in result lists, e.g. `[42] Midterm regrade`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("[{}] {}", self.nr, self.subject)
    }
}

/// Errors returned by a forum client.
#[derive(Debug, Error)]
pub enum ForumError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("forum returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("{method} failed: {message}")]
    Api { method: String, message: String },
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("not logged in")]
    NotLoggedIn,
}

/// Operations the core needs from the forum.
///
/// The transport behind it (HTTP, cookies, auth) is the implementor's
/// business; the fetcher and query engine only see these calls.
#[async_trait]
pub trait ForumClient: Send + Sync {
    /// Courses the signed-in user belongs to.
    async fn list_courses(&self) -> Result<Vec<Course>, ForumError>;

    /// One page of the course feed, newest first. May be empty.
    async fn get_page(
        &self,
        course: &Course,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Post>, ForumError>;

    /// The full discussion tree of a post.
    async fn get_post_tree(&self, course: &Course, nr: u64) -> Result<ThreadNode, ForumError>;

    /// Post a followup reply to a post.
    async fn post_reply(&self, course: &Course, nr: u64, text: &str) -> Result<(), ForumError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_label() {
        let course = Course {
            nid: "abc".to_string(),
            name: "CS 101".to_string(),
            term: "Fall 2024".to_string(),
        };
        assert_eq!(course.label(), "CS 101 [Fall 2024]");

        let untermed = Course {
            term: String::new(),
            ..course
        };
        assert_eq!(untermed.label(), "CS 101");
    }

    #[test]
    fn test_post_label() {
        let post = Post {
            nr: 42,
            id: "k1".to_string(),
            subject: "Midterm regrade".to_string(),
            preview: String::new(),
        };
        assert_eq!(post.label(), "[42] Midterm regrade");
    }
}
