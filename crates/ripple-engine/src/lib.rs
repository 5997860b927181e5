//! Optimistic interaction & cache-coherence engine.
//!
//! A tap on "like", "save", "follow" or a comment action applies locally
//! and renders immediately; a background call reconciles with the remote
//! service, rolling back exactly on failure. Per-key mutations are
//! serialized by [`MutationGuard`], committed outcomes propagate to every
//! cached view through the cache invalidator, and realtime change feeds
//! drive reconciliation fetches that never clobber pending optimistic
//! state.
//!
//! Everything hangs off a [`Session`]: explicit construction at sign-in,
//! [`Session::teardown`] at sign-out.

mod bridge;
mod comments;
mod config;
mod error;
mod guard;
mod interactions;
mod notice;
mod session;
mod store;

pub use bridge::{RealtimeBridge, ReconcileFn, SubscriptionHandle};
pub use comments::{CommentOutcome, CommentThread};
pub use config::{
    DEFAULT_MIN_INTERVAL_MS, DEFAULT_NOTICE_CAPACITY, DEFAULT_RECONNECT_BASE_SECS,
    DEFAULT_RECONNECT_MAX_SECS, DEFAULT_SNAPSHOT_TTL_SECS, EngineConfig,
};
pub use error::EngineError;
pub use guard::{ActionKind, ExpectedDelta, MutationGuard, MutationKey, MutationPermit, PendingMutation};
pub use interactions::{FollowOutcome, InteractionEngine, ToggleOutcome};
pub use notice::{Notice, Notices};
pub use session::Session;
pub use store::{AppliedChange, AppliedFollow, InteractionState, OptimisticStore};
