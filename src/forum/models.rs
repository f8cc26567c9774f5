//! Wire shapes of the forum's JSON-RPC responses.
//!
//! Only the fields the reader uses are declared; everything else in the
//! payloads is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Course, Post};
use crate::thread::{NodeKind, ThreadNode};

/// Every response is wrapped in `{ "result": ..., "error": ... }`.
#[derive(Debug, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of `user.status`.
#[derive(Debug, Deserialize)]
pub struct UserStatus {
    #[serde(default)]
    pub networks: Vec<RawNetwork>,
}

#[derive(Debug, Deserialize)]
pub struct RawNetwork {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub term: String,
}

impl From<RawNetwork> for Course {
    fn from(raw: RawNetwork) -> Self {
        Self {
            nid: raw.id,
            name: raw.name,
            term: raw.term,
        }
    }
}

/// Result of `network.get_my_feed`.
#[derive(Debug, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub feed: Vec<RawFeedItem>,
}

#[derive(Debug, Deserialize)]
pub struct RawFeedItem {
    #[serde(default)]
    pub id: String,
    pub nr: u64,
    #[serde(default)]
    pub subject: String,
    /// The forum spells it this way.
    #[serde(default, rename = "content_snipet")]
    pub snippet: String,
}

impl From<RawFeedItem> for Post {
    fn from(raw: RawFeedItem) -> Self {
        Self {
            nr: raw.nr,
            id: raw.id,
            subject: raw.subject,
            preview: raw.snippet,
        }
    }
}

/// Result of `content.get`, and each of its children.
#[derive(Debug, Default, Deserialize)]
pub struct RawContent {
    /// Content identifier, needed to reply to the post.
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Revisions, newest first. Answers and the original post carry these.
    #[serde(default)]
    pub history: Vec<RawRevision>,
    /// Followups and comments carry their text here instead of in `history`.
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub children: Vec<RawContent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawRevision {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

impl RawContent {
    /// Build the discussion tree rooted at this post.
    #[must_use]
    pub fn into_thread(self) -> ThreadNode {
        self.into_node(NodeKind::OriginalPost)
    }

    fn into_node(self, kind: NodeKind) -> ThreadNode {
        let RawContent {
            history,
            subject,
            uid,
            created,
            children,
            ..
        } = self;

        let (subject, body, author, created) = match history.into_iter().next() {
            Some(revision) => (
                revision.subject,
                revision.content,
                revision.uid.or(uid),
                revision.created.or(created),
            ),
            None => (String::new(), subject, uid, created),
        };

        ThreadNode {
            kind,
            author,
            created: created.as_deref().and_then(parse_timestamp),
            subject,
            body,
            children: children
                .into_iter()
                .map(|child| {
                    let kind = NodeKind::from_type_tag(&child.kind);
                    child.into_node(kind)
                })
                .collect(),
        }
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
