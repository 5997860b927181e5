//! Core types shared across the service boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of entity an interaction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Reel,
    Comment,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Post => write!(f, "post"),
            TargetKind::Reel => write!(f, "reel"),
            TargetKind::Comment => write!(f, "comment"),
        }
    }
}

/// A typed reference to an interaction target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: String,
}

impl TargetRef {
    pub fn new(kind: TargetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn post(id: impl Into<String>) -> Self {
        Self::new(TargetKind::Post, id)
    }

    pub fn reel(id: impl Into<String>) -> Self {
        Self::new(TargetKind::Reel, id)
    }

    pub fn comment(id: impl Into<String>) -> Self {
        Self::new(TargetKind::Comment, id)
    }

    /// Namespaced cache key for this target, e.g. `post:42`.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// The interaction fields of a single target as the server reports them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSnapshot {
    pub liked: bool,
    pub saved: bool,
    pub followed_author: bool,
    pub likes_count: u64,
    pub comments_count: u64,
}

/// Result of [`toggle_like`](crate::FeedService::toggle_like).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggleResult {
    /// The liked state after the toggle, as the server resolved it.
    pub liked: bool,
    /// The authoritative like count after the toggle.
    pub likes_count: u64,
}

/// Result of [`toggle_bookmark`](crate::FeedService::toggle_bookmark).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkToggleResult {
    pub saved: bool,
}

/// Result of [`toggle_follow`](crate::FeedService::toggle_follow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowToggleResult {
    pub following: bool,
}

/// Result of [`edit_comment`](crate::FeedService::edit_comment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEdit {
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

/// Result of [`toggle_pin`](crate::FeedService::toggle_pin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinToggleResult {
    pub is_pinned: bool,
    pub pinned_at: Option<DateTime<Utc>>,
}

/// Scope of a realtime change-feed subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchScope {
    pub kind: TargetKind,
    pub entity_id: String,
}

impl WatchScope {
    pub fn new(kind: TargetKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for WatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.entity_id)
    }
}

/// Operation carried by a change-feed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A single event from the remote change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub op: ChangeOp,
    /// Kind of the entity whose rows changed.
    pub kind: TargetKind,
    /// Id of the entity the changed row belongs to.
    pub entity_id: String,
    /// Id of the changed row itself (a comment id, a like row id, ...).
    pub row_id: String,
}
