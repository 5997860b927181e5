//! Optimistic interaction state with exact-rollback snapshots.

use dashmap::DashMap;
use tracing::trace;

use ripple_service::{InteractionSnapshot, TargetRef};

/// The viewing user's interaction state for one target.
///
/// Owned by [`OptimisticStore`]; the only writers are the store's
/// apply/rollback/reconcile entry points, which is what keeps every view
/// of the same entity coherent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub liked: bool,
    pub saved: bool,
    pub followed_author: bool,
    pub likes_count: u64,
    pub comments_count: u64,
}

impl From<InteractionSnapshot> for InteractionState {
    fn from(snap: InteractionSnapshot) -> Self {
        Self {
            liked: snap.liked,
            saved: snap.saved,
            followed_author: snap.followed_author,
            likes_count: snap.likes_count,
            comments_count: snap.comments_count,
        }
    }
}

impl From<InteractionState> for InteractionSnapshot {
    fn from(state: InteractionState) -> Self {
        Self {
            liked: state.liked,
            saved: state.saved,
            followed_author: state.followed_author,
            likes_count: state.likes_count,
            comments_count: state.comments_count,
        }
    }
}

/// A tentative state change with its pre-mutation snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AppliedChange {
    pub previous: InteractionState,
    pub next: InteractionState,
}

/// A tentative follow change.
#[derive(Debug, Clone, Copy)]
pub struct AppliedFollow {
    pub previous: bool,
    pub next: bool,
}

/// Applies tentative state changes synchronously and resolves them later
/// as commit, rollback, or reconcile-to-server.
///
/// `apply` retains the pre-mutation snapshot so a failed remote call can
/// restore it bit-for-bit; a disagreeing remote result is instead adopted
/// via `reconcile` — the server is authoritative, not the stale previous
/// value. Everything between awaits runs atomically with respect to other
/// UI events, so apply/snapshot pairs can never interleave per key.
pub struct OptimisticStore {
    /// Per-target interaction state.
    states: DashMap<TargetRef, InteractionState>,
    /// Target -> author, for sweeping follow changes across targets.
    authors: DashMap<TargetRef, String>,
    /// Per-author follow state.
    follows: DashMap<String, bool>,
}

impl OptimisticStore {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
            authors: DashMap::new(),
            follows: DashMap::new(),
        }
    }

    /// Install server-read state for a target.
    pub fn seed(&self, target: &TargetRef, author_id: &str, snapshot: InteractionSnapshot) {
        self.states.insert(target.clone(), snapshot.into());
        self.authors.insert(target.clone(), author_id.to_string());
        self.follows
            .insert(author_id.to_string(), snapshot.followed_author);
    }

    pub fn get(&self, target: &TargetRef) -> Option<InteractionState> {
        self.states.get(target).map(|s| *s)
    }

    pub fn author_of(&self, target: &TargetRef) -> Option<String> {
        self.authors.get(target).map(|a| a.value().clone())
    }

    /// Current follow state for an author, if known.
    pub fn following(&self, author_id: &str) -> Option<bool> {
        self.follows.get(author_id).map(|f| *f)
    }

    /// Apply a tentative mutation and retain the pre-mutation snapshot.
    pub fn apply(
        &self,
        target: &TargetRef,
        mutate: impl FnOnce(&mut InteractionState),
    ) -> AppliedChange {
        let mut entry = self.states.entry(target.clone()).or_default();
        let previous = *entry;
        mutate(&mut entry);
        let next = *entry;
        trace!(target = %target, ?previous, ?next, "applied tentative change");
        AppliedChange { previous, next }
    }

    /// Restore the exact pre-mutation snapshot.
    pub fn rollback(&self, target: &TargetRef, previous: InteractionState) {
        self.states.insert(target.clone(), previous);
        trace!(target = %target, "rolled back to previous state");
    }

    /// Overwrite with server-declared values; returns the resulting state.
    pub fn reconcile(
        &self,
        target: &TargetRef,
        adopt: impl FnOnce(&mut InteractionState),
    ) -> InteractionState {
        let mut entry = self.states.entry(target.clone()).or_default();
        adopt(&mut entry);
        trace!(target = %target, state = ?*entry, "reconciled to server state");
        *entry
    }

    /// Toggle the follow state for an author and sweep it across every
    /// tracked target by that author.
    pub fn apply_follow(&self, author_id: &str) -> AppliedFollow {
        let mut entry = self.follows.entry(author_id.to_string()).or_insert(false);
        let previous = *entry;
        *entry = !previous;
        let next = *entry;
        drop(entry);
        self.sweep_follow(author_id, next);
        AppliedFollow { previous, next }
    }

    /// Force the follow state for an author (rollback or server value).
    pub fn set_follow(&self, author_id: &str, following: bool) {
        self.follows.insert(author_id.to_string(), following);
        self.sweep_follow(author_id, following);
    }

    fn sweep_follow(&self, author_id: &str, following: bool) {
        for entry in self.authors.iter() {
            if entry.value().as_str() == author_id
                && let Some(mut state) = self.states.get_mut(entry.key())
            {
                state.followed_author = following;
            }
        }
    }

    /// Drop one target's state (owning view unmounted and evicted).
    pub fn remove(&self, target: &TargetRef) {
        self.states.remove(target);
        self.authors.remove(target);
    }

    /// Drop everything (sign-out).
    pub fn clear(&self) {
        self.states.clear();
        self.authors.clear();
        self.follows.clear();
    }
}

impl Default for OptimisticStore {
    fn default() -> Self {
        Self::new()
    }
}
