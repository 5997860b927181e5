//! The abstract feed-service contract.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ServiceError;
use crate::records::{Comment, FeedItem};
use crate::types::{
    BookmarkToggleResult, ChangeEvent, CommentEdit, FollowToggleResult, InteractionSnapshot,
    LikeToggleResult, PinToggleResult, TargetRef, WatchScope,
};

/// Stream of change events for one subscription.
///
/// The channel closing (recv returning `None`) signals a transient
/// disconnect; subscribers are expected to resubscribe and issue a one-shot
/// reconciliation fetch.
pub type ChangeFeed = mpsc::Receiver<ChangeEvent>;

/// Call contracts of the remote data service.
///
/// The remote service is the source of truth: every toggle returns the
/// state it resolved to, which the engine commits or reconciles against.
/// Transport, retries at the wire level and authentication are the
/// implementor's concern.
#[async_trait]
pub trait FeedService: Send + Sync {
    /// Idempotent like toggle; returns the resulting liked state and count.
    async fn toggle_like(
        &self,
        target: &TargetRef,
        user_id: &str,
    ) -> Result<LikeToggleResult, ServiceError>;

    /// Additive like used by the double-tap gesture; never removes a like.
    async fn add_like(&self, target: &TargetRef, user_id: &str) -> Result<(), ServiceError>;

    /// Idempotent bookmark toggle.
    async fn toggle_bookmark(
        &self,
        target: &TargetRef,
        user_id: &str,
    ) -> Result<BookmarkToggleResult, ServiceError>;

    /// Idempotent follow toggle against another user.
    async fn toggle_follow(
        &self,
        target_user_id: &str,
        user_id: &str,
    ) -> Result<FollowToggleResult, ServiceError>;

    /// Create a comment (or reply, when `parent_id` is set) on an entity.
    async fn create_comment(
        &self,
        entity: &TargetRef,
        user_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Comment, ServiceError>;

    /// Replace a comment's content; returns the server-stamped edit.
    async fn edit_comment(
        &self,
        comment_id: &str,
        content: &str,
    ) -> Result<CommentEdit, ServiceError>;

    /// Delete a comment.
    async fn delete_comment(&self, comment_id: &str) -> Result<(), ServiceError>;

    /// Pin or unpin a comment; returns the server-stamped pin state.
    async fn toggle_pin(
        &self,
        comment_id: &str,
        actor_id: &str,
    ) -> Result<PinToggleResult, ServiceError>;

    /// Write back a corrected denormalized comment count (self-healing).
    async fn set_comments_count(
        &self,
        entity: &TargetRef,
        count: u64,
    ) -> Result<(), ServiceError>;

    /// Open a change feed for the watched scope.
    async fn subscribe_changes(&self, scope: WatchScope) -> Result<ChangeFeed, ServiceError>;

    /// Read the viewing user's interaction state for a target.
    async fn read_interaction(
        &self,
        target: &TargetRef,
        user_id: &str,
    ) -> Result<InteractionSnapshot, ServiceError>;

    /// Read the flat comment list of an entity, in creation order.
    async fn read_comments(&self, entity: &TargetRef) -> Result<Vec<Comment>, ServiceError>;

    /// Read a collection page by key (e.g. `feed:home:1`).
    async fn read_collection(&self, key: &str) -> Result<Vec<FeedItem>, ServiceError>;
}
