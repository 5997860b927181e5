//! In-process implementation of the feed-service contract.
//!
//! Backs tests and local development. State lives in concurrent maps, the
//! change feed is fanned out to per-subscriber channels, and failures can
//! be injected ahead of any call to exercise rollback paths.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::records::{Comment, FeedItem};
use crate::service::{ChangeFeed, FeedService};
use crate::types::{
    BookmarkToggleResult, ChangeEvent, ChangeOp, CommentEdit, FollowToggleResult,
    InteractionSnapshot, LikeToggleResult, PinToggleResult, TargetRef, WatchScope,
};

/// Capacity of each subscriber's change-feed channel.
const FEED_CHANNEL_CAPACITY: usize = 64;

/// Server-side state of one entity (post or reel).
#[derive(Debug, Default, Clone)]
struct EntityState {
    author_id: String,
    liked_by: HashSet<String>,
    saved_by: HashSet<String>,
    comments_count: u64,
}

/// One active change-feed subscription.
struct FeedSub {
    scope: WatchScope,
    tx: mpsc::Sender<ChangeEvent>,
}

/// In-memory [`FeedService`] with failure injection and call counting.
pub struct InMemoryFeedService {
    /// Entities keyed by `TargetRef::cache_key()`.
    entities: DashMap<String, EntityState>,
    /// Flat comment lists keyed by the owning entity's cache key.
    comments: DashMap<String, Vec<Comment>>,
    /// Comment id -> owning entity cache key.
    comment_index: DashMap<String, String>,
    /// Follower -> set of followed user ids.
    follows: DashMap<String, HashSet<String>>,
    /// Collection pages by key.
    collections: DashMap<String, Vec<FeedItem>>,
    /// Active change-feed subscribers.
    feeds: DashMap<u64, FeedSub>,
    next_feed_id: AtomicU64,
    /// Failures to return from upcoming calls, oldest first.
    fail_queue: Mutex<VecDeque<ServiceError>>,
    /// Calls per operation name.
    calls: DashMap<&'static str, u64>,
}

impl InMemoryFeedService {
    pub fn new() -> Self {
        Self {
            entities: DashMap::new(),
            comments: DashMap::new(),
            comment_index: DashMap::new(),
            follows: DashMap::new(),
            collections: DashMap::new(),
            feeds: DashMap::new(),
            next_feed_id: AtomicU64::new(0),
            fail_queue: Mutex::new(VecDeque::new()),
            calls: DashMap::new(),
        }
    }

    // =========================================================================
    // Test/seeding surface
    // =========================================================================

    /// Register an entity with its author.
    pub fn seed_entity(&self, target: &TargetRef, author_id: impl Into<String>) {
        self.entities.insert(
            target.cache_key(),
            EntityState {
                author_id: author_id.into(),
                ..EntityState::default()
            },
        );
    }

    /// Mark a target as liked server-side by the given users.
    pub fn seed_likes(&self, target: &TargetRef, users: &[&str]) {
        if let Some(mut entity) = self.entities.get_mut(&target.cache_key()) {
            for user in users {
                entity.liked_by.insert((*user).to_string());
            }
        }
    }

    /// Replace an entity's flat comment list.
    pub fn seed_comments(&self, entity: &TargetRef, comments: Vec<Comment>) {
        let key = entity.cache_key();
        for comment in &comments {
            self.comment_index.insert(comment.id.clone(), key.clone());
        }
        if let Some(mut state) = self.entities.get_mut(&key) {
            state.comments_count = comments.len() as u64;
        }
        self.comments.insert(key, comments);
    }

    /// Store a collection page.
    pub fn put_collection(&self, key: impl Into<String>, items: Vec<FeedItem>) {
        self.collections.insert(key.into(), items);
    }

    /// Queue an error to be returned by the next remote call.
    pub async fn inject_failure(&self, err: ServiceError) {
        self.fail_queue.lock().await.push_back(err);
    }

    /// How many times the named operation was invoked.
    pub fn call_count(&self, op: &str) -> u64 {
        self.calls.get(op).map(|c| *c).unwrap_or(0)
    }

    /// Drop every active change feed, simulating a transient disconnect.
    pub fn disconnect_feeds(&self) {
        let count = self.feeds.len();
        self.feeds.clear();
        debug!(count, "dropped all change feeds");
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn gate(&self, op: &'static str) -> Result<(), ServiceError> {
        *self.calls.entry(op).or_insert(0) += 1;
        if let Some(err) = self.fail_queue.lock().await.pop_front() {
            trace!(op, error = %err, "returning injected failure");
            return Err(err);
        }
        Ok(())
    }

    fn publish(&self, event: ChangeEvent) {
        self.feeds.retain(|_, sub| {
            let relevant =
                sub.scope.kind == event.kind && sub.scope.entity_id == event.entity_id;
            if !relevant {
                return true;
            }
            // A full or closed channel means the subscriber is gone or
            // hopelessly behind; drop the subscription either way.
            sub.tx.try_send(event.clone()).is_ok()
        });
    }

    fn entity(&self, target: &TargetRef) -> Result<dashmap::mapref::one::RefMut<'_, String, EntityState>, ServiceError> {
        self.entities
            .get_mut(&target.cache_key())
            .ok_or_else(|| ServiceError::Validation(format!("unknown target {target}")))
    }
}

impl Default for InMemoryFeedService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedService for InMemoryFeedService {
    async fn toggle_like(
        &self,
        target: &TargetRef,
        user_id: &str,
    ) -> Result<LikeToggleResult, ServiceError> {
        self.gate("toggle_like").await?;
        let result = {
            let mut entity = self.entity(target)?;
            let liked = if entity.liked_by.remove(user_id) {
                false
            } else {
                entity.liked_by.insert(user_id.to_string());
                true
            };
            LikeToggleResult {
                liked,
                likes_count: entity.liked_by.len() as u64,
            }
        };
        self.publish(ChangeEvent {
            op: ChangeOp::Update,
            kind: target.kind,
            entity_id: target.id.clone(),
            row_id: target.id.clone(),
        });
        Ok(result)
    }

    async fn add_like(&self, target: &TargetRef, user_id: &str) -> Result<(), ServiceError> {
        self.gate("add_like").await?;
        {
            let mut entity = self.entity(target)?;
            entity.liked_by.insert(user_id.to_string());
        }
        self.publish(ChangeEvent {
            op: ChangeOp::Update,
            kind: target.kind,
            entity_id: target.id.clone(),
            row_id: target.id.clone(),
        });
        Ok(())
    }

    async fn toggle_bookmark(
        &self,
        target: &TargetRef,
        user_id: &str,
    ) -> Result<BookmarkToggleResult, ServiceError> {
        self.gate("toggle_bookmark").await?;
        let mut entity = self.entity(target)?;
        let saved = if entity.saved_by.remove(user_id) {
            false
        } else {
            entity.saved_by.insert(user_id.to_string());
            true
        };
        Ok(BookmarkToggleResult { saved })
    }

    async fn toggle_follow(
        &self,
        target_user_id: &str,
        user_id: &str,
    ) -> Result<FollowToggleResult, ServiceError> {
        self.gate("toggle_follow").await?;
        let mut followed = self.follows.entry(user_id.to_string()).or_default();
        let following = if followed.remove(target_user_id) {
            false
        } else {
            followed.insert(target_user_id.to_string());
            true
        };
        Ok(FollowToggleResult { following })
    }

    async fn create_comment(
        &self,
        entity: &TargetRef,
        user_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<Comment, ServiceError> {
        self.gate("create_comment").await?;
        let key = entity.cache_key();

        let comment = Comment::new(
            Uuid::new_v4().to_string(),
            user_id,
            content,
            parent_id.map(str::to_string),
            Utc::now(),
        );

        // Validate before any state changes so a rejection leaves no trace.
        self.entity(entity)?;
        let mut list = self.comments.entry(key.clone()).or_default();
        if let Some(parent) = parent_id {
            let parent_entry = list
                .iter_mut()
                .find(|c| c.id == parent)
                .ok_or_else(|| ServiceError::Validation(format!("unknown parent {parent}")))?;
            parent_entry.replies_count += 1;
        }
        list.push(comment.clone());
        drop(list);

        if let Some(mut state) = self.entities.get_mut(&key) {
            state.comments_count += 1;
        }

        self.comment_index.insert(comment.id.clone(), key);
        self.publish(ChangeEvent {
            op: ChangeOp::Insert,
            kind: entity.kind,
            entity_id: entity.id.clone(),
            row_id: comment.id.clone(),
        });
        Ok(comment)
    }

    async fn edit_comment(
        &self,
        comment_id: &str,
        content: &str,
    ) -> Result<CommentEdit, ServiceError> {
        self.gate("edit_comment").await?;
        let key = self
            .comment_index
            .get(comment_id)
            .map(|k| k.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;

        let mut list = self
            .comments
            .get_mut(&key)
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;
        let comment = list
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;

        let edited_at = Utc::now();
        comment.content = content.to_string();
        comment.edited_at = Some(edited_at);
        comment.is_edited = true;
        let edit = CommentEdit {
            content: comment.content.clone(),
            edited_at,
        };
        drop(list);

        self.publish_comment_event(ChangeOp::Update, &key, comment_id);
        Ok(edit)
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<(), ServiceError> {
        self.gate("delete_comment").await?;
        let key = self
            .comment_index
            .remove(comment_id)
            .map(|(_, k)| k)
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;

        let mut list = self
            .comments
            .get_mut(&key)
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;
        let pos = list
            .iter()
            .position(|c| c.id == comment_id)
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;
        let removed = list.remove(pos);

        // Re-parent the removed comment's direct replies and fix counters.
        for c in list.iter_mut() {
            if c.parent_id.as_deref() == Some(comment_id) {
                c.parent_id = removed.parent_id.clone();
            }
        }
        if let Some(parent) = removed.parent_id.as_deref()
            && let Some(parent_entry) = list.iter_mut().find(|c| c.id == parent)
        {
            parent_entry.replies_count = parent_entry.replies_count.saturating_sub(1);
        }
        drop(list);

        if let Some(mut state) = self.entities.get_mut(&key) {
            state.comments_count = state.comments_count.saturating_sub(1);
        }

        self.publish_comment_event(ChangeOp::Delete, &key, comment_id);
        Ok(())
    }

    async fn toggle_pin(
        &self,
        comment_id: &str,
        _actor_id: &str,
    ) -> Result<PinToggleResult, ServiceError> {
        self.gate("toggle_pin").await?;
        let key = self
            .comment_index
            .get(comment_id)
            .map(|k| k.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;

        let mut list = self
            .comments
            .get_mut(&key)
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;
        let comment = list
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| ServiceError::NotFound(format!("comment {comment_id}")))?;

        if comment.is_pinned {
            comment.is_pinned = false;
            comment.pinned_at = None;
        } else {
            comment.is_pinned = true;
            comment.pinned_at = Some(Utc::now());
        }
        let result = PinToggleResult {
            is_pinned: comment.is_pinned,
            pinned_at: comment.pinned_at,
        };
        drop(list);

        self.publish_comment_event(ChangeOp::Update, &key, comment_id);
        Ok(result)
    }

    async fn set_comments_count(
        &self,
        entity: &TargetRef,
        count: u64,
    ) -> Result<(), ServiceError> {
        self.gate("set_comments_count").await?;
        let mut state = self.entity(entity)?;
        state.comments_count = count;
        Ok(())
    }

    async fn subscribe_changes(&self, scope: WatchScope) -> Result<ChangeFeed, ServiceError> {
        self.gate("subscribe_changes").await?;
        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let id = self.next_feed_id.fetch_add(1, Ordering::Relaxed);
        debug!(feed = id, scope = %scope, "change feed opened");
        self.feeds.insert(id, FeedSub { scope, tx });
        Ok(rx)
    }

    async fn read_interaction(
        &self,
        target: &TargetRef,
        user_id: &str,
    ) -> Result<InteractionSnapshot, ServiceError> {
        self.gate("read_interaction").await?;
        let entity = self
            .entities
            .get(&target.cache_key())
            .ok_or_else(|| ServiceError::NotFound(format!("target {target}")))?;
        let followed_author = self
            .follows
            .get(user_id)
            .map(|f| f.contains(&entity.author_id))
            .unwrap_or(false);
        Ok(InteractionSnapshot {
            liked: entity.liked_by.contains(user_id),
            saved: entity.saved_by.contains(user_id),
            followed_author,
            likes_count: entity.liked_by.len() as u64,
            comments_count: entity.comments_count,
        })
    }

    async fn read_comments(&self, entity: &TargetRef) -> Result<Vec<Comment>, ServiceError> {
        self.gate("read_comments").await?;
        Ok(self
            .comments
            .get(&entity.cache_key())
            .map(|c| c.value().clone())
            .unwrap_or_default())
    }

    async fn read_collection(&self, key: &str) -> Result<Vec<FeedItem>, ServiceError> {
        self.gate("read_collection").await?;
        self.collections
            .get(key)
            .map(|c| c.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("collection {key}")))
    }
}

impl InMemoryFeedService {
    /// Publish a comment-row event against the owning entity's scope.
    fn publish_comment_event(&self, op: ChangeOp, entity_key: &str, row_id: &str) {
        // Cache keys are `kind:id`; split back into scope parts.
        let Some((kind, entity_id)) = entity_key.split_once(':') else {
            return;
        };
        let kind = match kind {
            "post" => crate::types::TargetKind::Post,
            "reel" => crate::types::TargetKind::Reel,
            "comment" => crate::types::TargetKind::Comment,
            _ => return,
        };
        self.publish(ChangeEvent {
            op,
            kind,
            entity_id: entity_id.to_string(),
            row_id: row_id.to_string(),
        });
    }
}
