//! Record types returned by the feed service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{InteractionSnapshot, TargetKind};

/// A comment as stored by the remote service.
///
/// The wire shape is flat: `parent_id` links a reply to its parent within
/// the same entity, and `replies` is populated only client-side by the tree
/// builder. It is skipped during serialization so persisted snapshots never
/// carry cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub content: String,
    pub author_id: String,
    /// Parent comment id, or `None` for a top-level comment.
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub likes_count: u64,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub pinned_at: Option<DateTime<Utc>>,
    /// Denormalized count of direct replies.
    #[serde(default)]
    pub replies_count: u64,
    /// Nested replies, populated by the tree builder only.
    #[serde(skip)]
    pub replies: Vec<Comment>,
}

impl Comment {
    /// A freshly created top-level or reply comment.
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
        parent_id: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            author_id: author_id.into(),
            parent_id,
            created_at,
            edited_at: None,
            is_edited: false,
            likes_count: 0,
            is_pinned: false,
            pinned_at: None,
            replies_count: 0,
            replies: Vec::new(),
        }
    }
}

/// A single element of a cached collection page (home feed, profile feed,
/// saved items, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: String,
    pub author_id: String,
    pub kind: TargetKind,
    pub interaction: InteractionSnapshot,
}

impl FeedItem {
    pub fn new(
        id: impl Into<String>,
        author_id: impl Into<String>,
        kind: TargetKind,
        interaction: InteractionSnapshot,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            kind,
            interaction,
        }
    }
}
