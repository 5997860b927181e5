//! Comment thread orchestration: optimistic tree mutations with exact
//! rollback and a self-healing denormalized count.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use ripple_cache::{CacheInvalidator, InteractionPatch, PatchTarget, PersistentCache};
use ripple_comments::{count_all, find, flatten, insert_comment, nest, remove_comment, sort_pinned, update_comment};
use ripple_service::{Comment, FeedService, ServiceError, TargetRef};

use crate::error::EngineError;
use crate::guard::{ActionKind, MutationGuard, MutationKey};
use crate::notice::{Notice, Notices};
use crate::store::OptimisticStore;

/// Outcome of a guarded comment mutation.
///
/// `Ignored` means the guard dropped a duplicate submission. `Resolved`
/// means the flow ran to its final state — committed, reconciled or
/// rolled back; failures surface as notices, never as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOutcome {
    Resolved,
    Ignored,
}

/// The comment tree of one entity plus its guarded mutation flows.
///
/// The tree is always the latest output of the pure transformations in
/// `ripple-comments`; mutations swap whole trees so rollback is a matter
/// of restoring the retained snapshot.
pub struct CommentThread {
    entity: TargetRef,
    user_id: String,
    service: Arc<dyn FeedService>,
    guard: MutationGuard,
    store: Arc<OptimisticStore>,
    invalidator: CacheInvalidator,
    persistent: Arc<PersistentCache>,
    notices: Notices,
    comments_ttl: Duration,
    tree: RwLock<Vec<Comment>>,
}

impl CommentThread {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        entity: TargetRef,
        user_id: String,
        service: Arc<dyn FeedService>,
        guard: MutationGuard,
        store: Arc<OptimisticStore>,
        invalidator: CacheInvalidator,
        persistent: Arc<PersistentCache>,
        notices: Notices,
        comments_ttl: Duration,
    ) -> Self {
        Self {
            entity,
            user_id,
            service,
            guard,
            store,
            invalidator,
            persistent,
            notices,
            comments_ttl,
            tree: RwLock::new(Vec::new()),
        }
    }

    pub fn entity(&self) -> &TargetRef {
        &self.entity
    }

    fn cache_key(&self) -> String {
        format!("comments:{}", self.entity.cache_key())
    }

    /// The current nested tree.
    pub async fn comments(&self) -> Vec<Comment> {
        self.tree.read().await.clone()
    }

    /// Load the thread through the persistent cache, then self-heal the
    /// denormalized comment count against the tree size.
    #[tracing::instrument(skip(self), fields(entity = %self.entity))]
    pub async fn load(&self) -> Result<Vec<Comment>, EngineError> {
        let service = Arc::clone(&self.service);
        let entity = self.entity.clone();
        let flat: Vec<Comment> = self
            .persistent
            .read_through(&self.cache_key(), self.comments_ttl, move || async move {
                service.read_comments(&entity).await
            })
            .await?;

        let tree = sort_pinned(nest(flat));
        *self.tree.write().await = tree.clone();
        self.reconcile_count().await;
        Ok(tree)
    }

    /// Full reconciliation fetch: replace the tree and interaction state
    /// with what the server holds, unless a mutation against this entity
    /// is pending — optimistic state is never overwritten from underneath.
    #[tracing::instrument(skip(self), fields(entity = %self.entity))]
    pub async fn refresh(&self) -> Result<(), EngineError> {
        let flat = self.service.read_comments(&self.entity).await?;
        let snapshot = self
            .service
            .read_interaction(&self.entity, &self.user_id)
            .await?;

        if self.guard.pending_for_target(&self.entity.id) {
            debug!("mutation pending, skipping refresh apply");
            return Ok(());
        }

        *self.tree.write().await = sort_pinned(nest(flat.clone()));
        self.store.reconcile(&self.entity, |s| *s = snapshot.into());
        self.invalidator.broadcast(
            &PatchTarget::Entity(self.entity.id.clone()),
            InteractionPatch {
                liked: Some(snapshot.liked),
                saved: Some(snapshot.saved),
                followed_author: Some(snapshot.followed_author),
                likes_count: Some(snapshot.likes_count),
                comments_count: Some(snapshot.comments_count),
            },
        );
        self.persist().await;
        debug!(count = flat.len(), "thread refreshed from server");
        Ok(())
    }

    /// Submit a comment or reply.
    #[tracing::instrument(skip(self, content), fields(entity = %self.entity, user = %self.user_id))]
    pub async fn post_comment(
        &self,
        content: &str,
        parent_id: Option<&str>,
    ) -> CommentOutcome {
        let key = MutationKey::new(&self.user_id, &self.entity.id, ActionKind::Comment);
        let Some(_permit) = self.guard.try_acquire(key) else {
            trace!("comment submit ignored");
            return CommentOutcome::Ignored;
        };

        let local_id = format!("local-{}", Uuid::new_v4());
        let optimistic = Comment::new(
            &local_id,
            &self.user_id,
            content,
            parent_id.map(str::to_string),
            Utc::now(),
        );

        let snapshot = self.tree.read().await.clone();
        {
            let mut tree = self.tree.write().await;
            let (next, inserted) = insert_comment(std::mem::take(&mut *tree), optimistic);
            if !inserted {
                *tree = next;
                drop(tree);
                self.notices.emit(Notice::ActionRejected {
                    action: ActionKind::Comment,
                    target_id: self.entity.id.clone(),
                    message: "the comment you are replying to no longer exists".to_string(),
                });
                return CommentOutcome::Resolved;
            }
            *tree = sort_pinned(next);
        }
        let change = self.store.apply(&self.entity, |s| s.comments_count += 1);
        self.patch_counts(change.next.comments_count);

        match self
            .service
            .create_comment(&self.entity, &self.user_id, content, parent_id)
            .await
        {
            Ok(created) => {
                // Swap the local placeholder for the server row.
                let mut tree = self.tree.write().await;
                let (without, _) = remove_comment(std::mem::take(&mut *tree), &local_id);
                let (with_created, _) = insert_comment(without, created);
                *tree = sort_pinned(with_created);
                drop(tree);
                self.persist().await;
                debug!("comment committed");
                CommentOutcome::Resolved
            }
            Err(err) => {
                *self.tree.write().await = snapshot;
                self.store.rollback(&self.entity, change.previous);
                self.patch_counts(change.previous.comments_count);
                self.notify_failure(ActionKind::Comment, &self.entity.id, err);
                CommentOutcome::Resolved
            }
        }
    }

    /// Edit a comment's content.
    #[tracing::instrument(skip(self, content), fields(entity = %self.entity, comment = %comment_id))]
    pub async fn edit_comment(&self, comment_id: &str, content: &str) -> CommentOutcome {
        let key = MutationKey::new(&self.user_id, comment_id, ActionKind::Comment);
        let Some(_permit) = self.guard.try_acquire(key) else {
            trace!("comment edit ignored");
            return CommentOutcome::Ignored;
        };

        let snapshot = self.tree.read().await.clone();
        {
            let mut tree = self.tree.write().await;
            let content = content.to_string();
            let (next, found) = update_comment(std::mem::take(&mut *tree), comment_id, |c| {
                c.content = content;
                c.is_edited = true;
                c.edited_at = Some(Utc::now());
            });
            *tree = next;
            if !found {
                drop(tree);
                self.notices.emit(Notice::ActionRejected {
                    action: ActionKind::Comment,
                    target_id: comment_id.to_string(),
                    message: "this comment no longer exists".to_string(),
                });
                return CommentOutcome::Resolved;
            }
        }

        match self.service.edit_comment(comment_id, content).await {
            Ok(edit) => {
                // Adopt the server's stamp.
                let mut tree = self.tree.write().await;
                let (next, _) = update_comment(std::mem::take(&mut *tree), comment_id, |c| {
                    c.content = edit.content;
                    c.edited_at = Some(edit.edited_at);
                });
                *tree = next;
                drop(tree);
                self.persist().await;
                debug!("comment edit committed");
                CommentOutcome::Resolved
            }
            Err(err) => {
                *self.tree.write().await = snapshot;
                self.notify_failure(ActionKind::Comment, comment_id, err);
                CommentOutcome::Resolved
            }
        }
    }

    /// Delete a comment. Its replies are re-parented to the deleted
    /// comment's parent; counts decrement by exactly one.
    #[tracing::instrument(skip(self), fields(entity = %self.entity, comment = %comment_id))]
    pub async fn delete_comment(&self, comment_id: &str) -> CommentOutcome {
        let key = MutationKey::new(&self.user_id, comment_id, ActionKind::Comment);
        let Some(_permit) = self.guard.try_acquire(key) else {
            trace!("comment delete ignored");
            return CommentOutcome::Ignored;
        };

        let snapshot = self.tree.read().await.clone();
        {
            let mut tree = self.tree.write().await;
            let (next, removed) = remove_comment(std::mem::take(&mut *tree), comment_id);
            if !removed {
                *tree = next;
                drop(tree);
                self.notices.emit(Notice::ActionRejected {
                    action: ActionKind::Comment,
                    target_id: comment_id.to_string(),
                    message: "this comment no longer exists".to_string(),
                });
                return CommentOutcome::Resolved;
            }
            *tree = sort_pinned(next);
        }
        let change = self.store.apply(&self.entity, |s| {
            s.comments_count = s.comments_count.saturating_sub(1);
        });
        self.patch_counts(change.next.comments_count);

        match self.service.delete_comment(comment_id).await {
            Ok(()) => {
                self.persist().await;
                debug!("comment delete committed");
                CommentOutcome::Resolved
            }
            Err(err) => {
                *self.tree.write().await = snapshot;
                self.store.rollback(&self.entity, change.previous);
                self.patch_counts(change.previous.comments_count);
                self.notify_failure(ActionKind::Comment, comment_id, err);
                CommentOutcome::Resolved
            }
        }
    }

    /// Pin or unpin a comment and re-order the thread.
    #[tracing::instrument(skip(self), fields(entity = %self.entity, comment = %comment_id))]
    pub async fn toggle_pin(&self, comment_id: &str) -> CommentOutcome {
        let key = MutationKey::new(&self.user_id, comment_id, ActionKind::Pin);
        let Some(_permit) = self.guard.try_acquire(key) else {
            trace!("pin toggle ignored");
            return CommentOutcome::Ignored;
        };

        let snapshot = self.tree.read().await.clone();
        let pinned_now = {
            let mut tree = self.tree.write().await;
            let mut pinned_now = None;
            let (next, found) = update_comment(std::mem::take(&mut *tree), comment_id, |c| {
                if c.is_pinned {
                    c.is_pinned = false;
                    c.pinned_at = None;
                } else {
                    c.is_pinned = true;
                    c.pinned_at = Some(Utc::now());
                }
                pinned_now = Some(c.is_pinned);
            });
            *tree = sort_pinned(next);
            if !found {
                drop(tree);
                self.notices.emit(Notice::ActionRejected {
                    action: ActionKind::Pin,
                    target_id: comment_id.to_string(),
                    message: "this comment no longer exists".to_string(),
                });
                return CommentOutcome::Resolved;
            }
            pinned_now
        };

        match self.service.toggle_pin(comment_id, &self.user_id).await {
            Ok(result) if Some(result.is_pinned) == pinned_now => {
                self.persist().await;
                debug!(pinned = result.is_pinned, "pin toggle committed");
                CommentOutcome::Resolved
            }
            Ok(result) => {
                // Server disagrees; adopt its pin state and timestamp.
                let mut tree = self.tree.write().await;
                let (next, _) = update_comment(std::mem::take(&mut *tree), comment_id, |c| {
                    c.is_pinned = result.is_pinned;
                    c.pinned_at = result.pinned_at;
                });
                *tree = sort_pinned(next);
                drop(tree);
                self.persist().await;
                debug!(pinned = result.is_pinned, "pin toggle reconciled to server");
                CommentOutcome::Resolved
            }
            Err(err) => {
                *self.tree.write().await = snapshot;
                self.notify_failure(ActionKind::Pin, comment_id, err);
                CommentOutcome::Resolved
            }
        }
    }

    /// Reconcile the denormalized `comments_count` against the tree size,
    /// writing the correction back to the service (self-healing counter).
    pub async fn reconcile_count(&self) {
        let total = count_all(&self.tree.read().await);
        let Some(state) = self.store.get(&self.entity) else {
            return;
        };
        if state.comments_count == total {
            return;
        }

        debug!(
            denormalized = state.comments_count,
            actual = total,
            "comment count drifted, healing"
        );
        self.store
            .reconcile(&self.entity, |s| s.comments_count = total);
        self.patch_counts(total);
        if let Err(e) = self.service.set_comments_count(&self.entity, total).await {
            debug!(error = %e, "comment count write-back failed");
        }
    }

    /// Whether a comment id is present in the current tree.
    pub async fn contains(&self, comment_id: &str) -> bool {
        find(&self.tree.read().await, comment_id).is_some()
    }

    async fn persist(&self) {
        let flat = flatten(self.tree.read().await.clone());
        if let Err(e) = self.persistent.set(&self.cache_key(), &flat, self.comments_ttl) {
            warn!(entity = %self.entity, error = %e, "failed to persist comment snapshot");
        }
    }

    fn patch_counts(&self, comments_count: u64) {
        self.invalidator.broadcast(
            &PatchTarget::Entity(self.entity.id.clone()),
            InteractionPatch::comments_count(comments_count),
        );
    }

    fn notify_failure(&self, action: ActionKind, target_id: &str, err: ServiceError) {
        warn!(target = target_id, error = %err, "comment mutation failed, rolled back");
        self.notices.emit(match err {
            ServiceError::Validation(message) | ServiceError::NotFound(message) => {
                Notice::ActionRejected {
                    action,
                    target_id: target_id.to_string(),
                    message,
                }
            }
            other => Notice::ActionFailed {
                action,
                target_id: target_id.to_string(),
                message: other.to_string(),
            },
        });
    }
}
