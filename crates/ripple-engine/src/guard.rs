//! Per-key reentrancy lock with a trailing debounce window.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

/// Capacity of the release announcement channel.
const RELEASE_CHANNEL_CAPACITY: usize = 256;

/// The user-facing action a mutation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Like,
    Bookmark,
    Follow,
    Comment,
    Pin,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Like => write!(f, "like"),
            ActionKind::Bookmark => write!(f, "bookmark"),
            ActionKind::Follow => write!(f, "follow"),
            ActionKind::Comment => write!(f, "comment"),
            ActionKind::Pin => write!(f, "pin"),
        }
    }
}

/// Identity of one mutation: at most one may be in flight per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MutationKey {
    pub user_id: String,
    pub target_id: String,
    pub action: ActionKind,
}

impl MutationKey {
    pub fn new(
        user_id: impl Into<String>,
        target_id: impl Into<String>,
        action: ActionKind,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            target_id: target_id.into(),
            action,
        }
    }
}

impl std::fmt::Display for MutationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.target_id, self.action)
    }
}

/// The state change a pending mutation expects the server to confirm.
#[derive(Debug, Clone, Copy)]
pub struct ExpectedDelta {
    /// The boolean the toggle is expected to resolve to.
    pub flag: bool,
    /// The count movement applied optimistically.
    pub count_delta: i64,
}

/// Bookkeeping for one in-flight mutation.
#[derive(Debug, Clone)]
pub struct PendingMutation {
    pub issued_at: Instant,
    pub expected: Option<ExpectedDelta>,
}

struct GuardInner {
    min_interval: Duration,
    in_flight: DashMap<MutationKey, PendingMutation>,
    completed_at: DashMap<MutationKey, Instant>,
    released_tx: broadcast::Sender<MutationKey>,
}

/// Serializes mutations per key and suppresses duplicate-tap noise.
///
/// `try_acquire` refuses while a mutation for the key is pending, or when
/// the previous one completed inside the debounce window. Refusal has no
/// side effect — the UI appears to have silently ignored the tap. The
/// returned [`MutationPermit`] releases the key unconditionally on drop,
/// whatever path the flow took out of scope, and announces the release so
/// deferred realtime refreshes can resume.
#[derive(Clone)]
pub struct MutationGuard {
    inner: Arc<GuardInner>,
}

impl MutationGuard {
    pub fn new(min_interval: Duration) -> Self {
        let (released_tx, _) = broadcast::channel(RELEASE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(GuardInner {
                min_interval,
                in_flight: DashMap::new(),
                completed_at: DashMap::new(),
                released_tx,
            }),
        }
    }

    /// Acquire the key with the configured debounce window.
    pub fn try_acquire(&self, key: MutationKey) -> Option<MutationPermit> {
        self.try_acquire_with_interval(key, self.inner.min_interval)
    }

    /// Acquire the key with an explicit debounce window.
    pub fn try_acquire_with_interval(
        &self,
        key: MutationKey,
        min_interval: Duration,
    ) -> Option<MutationPermit> {
        use dashmap::mapref::entry::Entry;

        if let Some(done) = self.inner.completed_at.get(&key)
            && done.elapsed() < min_interval
        {
            trace!(key = %key, "rejected: inside debounce window");
            return None;
        }

        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => {
                trace!(key = %key, "rejected: mutation already pending");
                None
            }
            Entry::Vacant(entry) => {
                entry.insert(PendingMutation {
                    issued_at: Instant::now(),
                    expected: None,
                });
                Some(MutationPermit {
                    inner: Arc::clone(&self.inner),
                    key,
                })
            }
        }
    }

    /// Whether a mutation for this exact key is in flight.
    pub fn is_pending(&self, key: &MutationKey) -> bool {
        self.inner.in_flight.contains_key(key)
    }

    /// Whether any mutation against the target is in flight.
    pub fn pending_for_target(&self, target_id: &str) -> bool {
        self.inner
            .in_flight
            .iter()
            .any(|entry| entry.key().target_id == target_id)
    }

    /// Subscribe to key releases.
    pub fn subscribe_releases(&self) -> broadcast::Receiver<MutationKey> {
        self.inner.released_tx.subscribe()
    }
}

/// RAII hold on a mutation key.
pub struct MutationPermit {
    inner: Arc<GuardInner>,
    key: MutationKey,
}

impl MutationPermit {
    pub fn key(&self) -> &MutationKey {
        &self.key
    }

    /// Record the delta the server is expected to confirm; kept on the
    /// pending entry for diagnostics.
    pub fn record_expected(&self, expected: ExpectedDelta) {
        if let Some(mut pending) = self.inner.in_flight.get_mut(&self.key) {
            pending.expected = Some(expected);
        }
    }
}

impl Drop for MutationPermit {
    fn drop(&mut self) {
        self.inner.in_flight.remove(&self.key);
        self.inner
            .completed_at
            .insert(self.key.clone(), Instant::now());
        if self.inner.released_tx.send(self.key.clone()).is_err() {
            trace!(key = %self.key, "no subscribers for key release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(target: &str) -> MutationKey {
        MutationKey::new("viewer", target, ActionKind::Like)
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_rejected_while_held() {
        let guard = MutationGuard::new(Duration::from_millis(500));

        let permit = guard.try_acquire(key("42"));
        assert!(permit.is_some());
        assert!(guard.is_pending(&key("42")));
        assert!(guard.try_acquire(key("42")).is_none());

        // A different key is unaffected.
        assert!(guard.try_acquire(key("43")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn release_starts_the_debounce_window() {
        let guard = MutationGuard::new(Duration::from_millis(500));

        drop(guard.try_acquire(key("42")));
        assert!(!guard.is_pending(&key("42")));

        // Still inside the window: rejected.
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(guard.try_acquire(key("42")).is_none());

        // Past the window: accepted.
        tokio::time::advance(Duration::from_millis(301)).await;
        assert!(guard.try_acquire(key("42")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_does_not_reset_the_window() {
        let guard = MutationGuard::new(Duration::from_millis(500));
        drop(guard.try_acquire(key("42")));

        // Hammer the key inside the window; rejections must not extend it.
        for _ in 0..4 {
            tokio::time::advance(Duration::from_millis(100)).await;
            assert!(guard.try_acquire(key("42")).is_none());
        }
        tokio::time::advance(Duration::from_millis(101)).await;
        assert!(guard.try_acquire(key("42")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn release_is_announced() {
        let guard = MutationGuard::new(Duration::from_millis(500));
        let mut releases = guard.subscribe_releases();

        let permit = guard.try_acquire(key("42")).unwrap();
        drop(permit);

        let released = releases.recv().await.unwrap();
        assert_eq!(released, key("42"));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_for_target_spans_actions() {
        let guard = MutationGuard::new(Duration::from_millis(500));
        let _permit = guard
            .try_acquire(MutationKey::new("viewer", "42", ActionKind::Comment))
            .unwrap();

        assert!(guard.pending_for_target("42"));
        assert!(!guard.pending_for_target("43"));
    }
}
