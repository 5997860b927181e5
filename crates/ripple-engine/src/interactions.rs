//! Guarded optimistic flows for like, save and follow.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use ripple_cache::{CacheInvalidator, InteractionPatch, PatchTarget};
use ripple_service::{FeedService, ServiceError, TargetRef};

use crate::error::EngineError;
use crate::guard::{ActionKind, ExpectedDelta, MutationGuard, MutationKey};
use crate::notice::{Notice, Notices};
use crate::store::{AppliedChange, InteractionState, OptimisticStore};

/// Outcome of a guarded toggle.
///
/// `Ignored` means the guard silently dropped a duplicate tap. `Applied`
/// carries the final state after resolution — committed, reconciled to
/// the server, or rolled back; failures surface as notices, never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Applied(InteractionState),
    Ignored,
}

impl ToggleOutcome {
    pub fn state(&self) -> Option<InteractionState> {
        match self {
            ToggleOutcome::Applied(state) => Some(*state),
            ToggleOutcome::Ignored => None,
        }
    }
}

/// Outcome of a guarded follow toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowOutcome {
    Applied { following: bool },
    Ignored,
}

/// Like/save/follow flows: guard, apply optimistically, broadcast the
/// tentative patch, call the remote, then commit, reconcile or roll back
/// and broadcast the final patch.
#[derive(Clone)]
pub struct InteractionEngine {
    user_id: String,
    service: Arc<dyn FeedService>,
    guard: MutationGuard,
    store: Arc<OptimisticStore>,
    invalidator: CacheInvalidator,
    notices: Notices,
}

impl InteractionEngine {
    pub(crate) fn new(
        user_id: String,
        service: Arc<dyn FeedService>,
        guard: MutationGuard,
        store: Arc<OptimisticStore>,
        invalidator: CacheInvalidator,
        notices: Notices,
    ) -> Self {
        Self {
            user_id,
            service,
            guard,
            store,
            invalidator,
            notices,
        }
    }

    /// Read a target's interaction state from the service and install it.
    #[tracing::instrument(skip(self), fields(target = %target))]
    pub async fn load(
        &self,
        target: &TargetRef,
        author_id: &str,
    ) -> Result<InteractionState, EngineError> {
        let snapshot = self.service.read_interaction(target, &self.user_id).await?;
        self.store.seed(target, author_id, snapshot);
        Ok(snapshot.into())
    }

    /// Current local state for a target.
    pub fn state(&self, target: &TargetRef) -> Option<InteractionState> {
        self.store.get(target)
    }

    /// Toggle the like state of a post, reel or comment.
    #[tracing::instrument(skip(self), fields(target = %target, user = %self.user_id))]
    pub async fn toggle_like(&self, target: &TargetRef) -> ToggleOutcome {
        let key = MutationKey::new(&self.user_id, &target.id, ActionKind::Like);
        let Some(permit) = self.guard.try_acquire(key) else {
            trace!("like toggle ignored");
            return ToggleOutcome::Ignored;
        };

        let change = self.store.apply(target, |s| {
            s.liked = !s.liked;
            if s.liked {
                s.likes_count += 1;
            } else {
                s.likes_count = s.likes_count.saturating_sub(1);
            }
        });
        permit.record_expected(ExpectedDelta {
            flag: change.next.liked,
            count_delta: if change.next.liked { 1 } else { -1 },
        });
        self.patch_entity(
            target,
            InteractionPatch::liked(change.next.liked, change.next.likes_count),
        );

        match self.service.toggle_like(target, &self.user_id).await {
            Ok(result) if result.liked == change.next.liked => {
                debug!(liked = result.liked, "like toggle committed");
                ToggleOutcome::Applied(change.next)
            }
            Ok(result) => {
                // The server resolved differently; adopt its state, not
                // the stale pre-mutation value.
                let state = self.store.reconcile(target, |s| {
                    s.liked = result.liked;
                    s.likes_count = result.likes_count;
                });
                self.patch_entity(
                    target,
                    InteractionPatch::liked(result.liked, result.likes_count),
                );
                debug!(liked = result.liked, "like toggle reconciled to server");
                ToggleOutcome::Applied(state)
            }
            Err(err) => self.fail(
                ActionKind::Like,
                target,
                change,
                InteractionPatch::liked(change.previous.liked, change.previous.likes_count),
                err,
            ),
        }
    }

    /// Like-only transition for the double-tap gesture.
    ///
    /// Irreversible by design: already-liked targets are a pure animation
    /// no-op, and the remote operation is additive so a rapid duplicate
    /// gesture can never race the state back off.
    #[tracing::instrument(skip(self), fields(target = %target, user = %self.user_id))]
    pub async fn double_tap_like(&self, target: &TargetRef) -> ToggleOutcome {
        if self.store.get(target).map(|s| s.liked).unwrap_or(false) {
            trace!("double-tap on already-liked target");
            return ToggleOutcome::Ignored;
        }

        let key = MutationKey::new(&self.user_id, &target.id, ActionKind::Like);
        let Some(permit) = self.guard.try_acquire(key) else {
            trace!("double-tap like ignored");
            return ToggleOutcome::Ignored;
        };

        let change = self.store.apply(target, |s| {
            if !s.liked {
                s.liked = true;
                s.likes_count += 1;
            }
        });
        permit.record_expected(ExpectedDelta {
            flag: true,
            count_delta: 1,
        });
        self.patch_entity(
            target,
            InteractionPatch::liked(change.next.liked, change.next.likes_count),
        );

        match self.service.add_like(target, &self.user_id).await {
            Ok(()) => {
                debug!("double-tap like committed");
                ToggleOutcome::Applied(change.next)
            }
            Err(err) => self.fail(
                ActionKind::Like,
                target,
                change,
                InteractionPatch::liked(change.previous.liked, change.previous.likes_count),
                err,
            ),
        }
    }

    /// Toggle the bookmark state of a post or reel.
    #[tracing::instrument(skip(self), fields(target = %target, user = %self.user_id))]
    pub async fn toggle_bookmark(&self, target: &TargetRef) -> ToggleOutcome {
        let key = MutationKey::new(&self.user_id, &target.id, ActionKind::Bookmark);
        let Some(permit) = self.guard.try_acquire(key) else {
            trace!("bookmark toggle ignored");
            return ToggleOutcome::Ignored;
        };

        let change = self.store.apply(target, |s| {
            s.saved = !s.saved;
        });
        permit.record_expected(ExpectedDelta {
            flag: change.next.saved,
            count_delta: 0,
        });
        self.patch_entity(target, InteractionPatch::saved(change.next.saved));

        match self.service.toggle_bookmark(target, &self.user_id).await {
            Ok(result) if result.saved == change.next.saved => {
                debug!(saved = result.saved, "bookmark toggle committed");
                ToggleOutcome::Applied(change.next)
            }
            Ok(result) => {
                let state = self.store.reconcile(target, |s| {
                    s.saved = result.saved;
                });
                self.patch_entity(target, InteractionPatch::saved(result.saved));
                debug!(saved = result.saved, "bookmark toggle reconciled to server");
                ToggleOutcome::Applied(state)
            }
            Err(err) => self.fail(
                ActionKind::Bookmark,
                target,
                change,
                InteractionPatch::saved(change.previous.saved),
                err,
            ),
        }
    }

    /// Toggle following an author. The change propagates to every cached
    /// item by that author, across all collections.
    #[tracing::instrument(skip(self), fields(author = %author_id, user = %self.user_id))]
    pub async fn toggle_follow(&self, author_id: &str) -> FollowOutcome {
        let key = MutationKey::new(&self.user_id, author_id, ActionKind::Follow);
        let Some(permit) = self.guard.try_acquire(key) else {
            trace!("follow toggle ignored");
            return FollowOutcome::Ignored;
        };

        let change = self.store.apply_follow(author_id);
        permit.record_expected(ExpectedDelta {
            flag: change.next,
            count_delta: 0,
        });
        self.invalidator.broadcast(
            &PatchTarget::Author(author_id.to_string()),
            InteractionPatch::followed(change.next),
        );

        match self.service.toggle_follow(author_id, &self.user_id).await {
            Ok(result) if result.following == change.next => {
                debug!(following = result.following, "follow toggle committed");
                FollowOutcome::Applied {
                    following: change.next,
                }
            }
            Ok(result) => {
                self.store.set_follow(author_id, result.following);
                self.invalidator.broadcast(
                    &PatchTarget::Author(author_id.to_string()),
                    InteractionPatch::followed(result.following),
                );
                debug!(following = result.following, "follow toggle reconciled to server");
                FollowOutcome::Applied {
                    following: result.following,
                }
            }
            Err(err) => {
                self.store.set_follow(author_id, change.previous);
                self.invalidator.broadcast(
                    &PatchTarget::Author(author_id.to_string()),
                    InteractionPatch::followed(change.previous),
                );
                warn!(error = %err, "follow toggle failed, rolled back");
                self.notices.emit(match err {
                    ServiceError::Validation(message) | ServiceError::NotFound(message) => {
                        Notice::ActionRejected {
                            action: ActionKind::Follow,
                            target_id: author_id.to_string(),
                            message,
                        }
                    }
                    other => Notice::ActionFailed {
                        action: ActionKind::Follow,
                        target_id: author_id.to_string(),
                        message: other.to_string(),
                    },
                });
                FollowOutcome::Applied {
                    following: change.previous,
                }
            }
        }
    }

    /// Roll back after a failed remote call and surface the notice.
    fn fail(
        &self,
        action: ActionKind,
        target: &TargetRef,
        change: AppliedChange,
        rollback_patch: InteractionPatch,
        err: ServiceError,
    ) -> ToggleOutcome {
        self.store.rollback(target, change.previous);
        self.patch_entity(target, rollback_patch);
        warn!(target = %target, error = %err, "mutation failed, rolled back");
        self.notices.emit(match err {
            ServiceError::Validation(message) | ServiceError::NotFound(message) => {
                Notice::ActionRejected {
                    action,
                    target_id: target.id.clone(),
                    message,
                }
            }
            other => Notice::ActionFailed {
                action,
                target_id: target.id.clone(),
                message: other.to_string(),
            },
        });
        ToggleOutcome::Applied(change.previous)
    }

    fn patch_entity(&self, target: &TargetRef, patch: InteractionPatch) {
        self.invalidator
            .broadcast(&PatchTarget::Entity(target.id.clone()), patch);
    }
}
