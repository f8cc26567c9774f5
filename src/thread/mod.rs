//! Discussion trees and their flattening into display lines.
//!
//! A post view is built from a [`ThreadNode`] tree: the original post at the
//! root, answers and followups below it, comments below those. The
//! [`ThreadFlattener`] walks the tree once and produces an ordered list of
//! [`RenderLine`]s that the [`viewport::WindowedViewport`] scrolls over.

pub mod viewport;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::text::HtmlToText;

pub use viewport::WindowedViewport;

/// Who wrote an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKind {
    Student,
    Instructor,
}

/// The closed set of roles a node can play in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    OriginalPost,
    Answer(AnswerKind),
    Followup,
    Comment,
    Note,
}

impl NodeKind {
    /// Classify a child entry by the forum's type tag.
    ///
    /// Tags the forum may add later fall back to [`NodeKind::Comment`] so the
    /// entry is still shown.
    #[must_use]
    pub fn from_type_tag(tag: &str) -> Self {
        match tag {
            "s_answer" => Self::Answer(AnswerKind::Student),
            "i_answer" => Self::Answer(AnswerKind::Instructor),
            "followup" => Self::Followup,
            "note" => Self::Note,
            _ => Self::Comment,
        }
    }
}

/// One entry of a discussion tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNode {
    pub kind: NodeKind,
    pub author: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub subject: String,
    /// Body as HTML.
    pub body: String,
    /// Replies in feed order.
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    #[must_use]
    pub fn new(kind: NodeKind, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind,
            author: None,
            created: None,
            subject: subject.into(),
            body: body.into(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<ThreadNode>) -> Self {
        self.children = children;
        self
    }
}

/// Display role of a flattened line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    OriginalPost,
    StudentAnswer,
    InstructorAnswer,
    Followup,
    Note,
    Comment,
}

impl LineRole {
    fn for_child(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Answer(AnswerKind::Student) => Self::StudentAnswer,
            NodeKind::Answer(AnswerKind::Instructor) => Self::InstructorAnswer,
            NodeKind::Followup => Self::Followup,
            NodeKind::Note => Self::Note,
            NodeKind::Comment | NodeKind::OriginalPost => Self::Comment,
        }
    }

    /// Tag printed in front of the line.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::OriginalPost => "[OP]",
            Self::StudentAnswer => "[STUDENT]",
            Self::InstructorAnswer => "[INSTRUCTOR]",
            Self::Followup => "[FOLLOWUP]",
            Self::Note => "[NOTE]",
            Self::Comment => "[COMMENT]",
        }
    }

    fn placeholder(self) -> &'static str {
        match self {
            Self::OriginalPost => "(original post has no text)",
            Self::StudentAnswer => "(a student answered here)",
            Self::InstructorAnswer => "(an instructor answered here)",
            Self::Followup => "(empty followup)",
            Self::Note => "(empty note)",
            Self::Comment => "(empty comment)",
        }
    }
}

/// One flattened, indentation-tagged entry of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderLine {
    pub role: LineRole,
    pub text: String,
    pub depth: usize,
    pub author: Option<String>,
}

impl fmt::Display for RenderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = "    ".repeat(self.depth);
        write!(f, "{indent}{}", self.role.tag())?;
        for (i, line) in self.text.lines().enumerate() {
            if i == 0 {
                write!(f, " {line}")?;
            } else {
                write!(f, "\n{indent}{line}")?;
            }
        }
        Ok(())
    }
}

/// Turns a discussion tree into an ordered list of display lines.
#[derive(Clone)]
pub struct ThreadFlattener {
    text: Arc<dyn HtmlToText>,
}

impl ThreadFlattener {
    #[must_use]
    pub fn new(text: Arc<dyn HtmlToText>) -> Self {
        Self { text }
    }

    /// Flatten a tree in pre-order: the root at depth 0, each child one
    /// level below its parent, siblings in feed order.
    ///
    /// Uses an explicit stack rather than recursion.
    #[must_use]
    pub fn flatten(&self, root: &ThreadNode) -> Vec<RenderLine> {
        let mut lines = Vec::new();
        let mut stack: Vec<(&ThreadNode, usize)> = vec![(root, 0)];

        while let Some((node, depth)) = stack.pop() {
            let role = if depth == 0 {
                LineRole::OriginalPost
            } else {
                LineRole::for_child(node.kind)
            };
            lines.push(RenderLine {
                role,
                text: self.render_text(node, role),
                depth,
                author: node.author.clone(),
            });
            stack.extend(node.children.iter().rev().map(|child| (child, depth + 1)));
        }

        lines
    }

    fn render_text(&self, node: &ThreadNode, role: LineRole) -> String {
        let subject = node.subject.trim();
        let body = self.text.html_to_plain(&node.body);
        let body = body.trim();

        match (subject.is_empty(), body.is_empty()) {
            (true, true) => role.placeholder().to_string(),
            (false, true) => subject.to_string(),
            (true, false) => body.to_string(),
            (false, false) => format!("{subject}\n{body}"),
        }
    }
}
