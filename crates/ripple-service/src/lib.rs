//! Remote feed-service contract for ripple.
//!
//! This crate defines the call contracts the interaction engine consumes:
//! record types for posts, reels and comments, typed per-operation results
//! validated at the boundary, the change-feed event types, and the
//! [`FeedService`] trait itself. Transport and authentication live behind
//! the trait; [`InMemoryFeedService`] is a complete in-process
//! implementation used by tests and local development.

mod error;
pub mod memory;
mod records;
mod service;
mod types;

pub use error::ServiceError;
pub use memory::InMemoryFeedService;
pub use records::{Comment, FeedItem};
pub use service::{ChangeFeed, FeedService};
pub use types::{
    BookmarkToggleResult, ChangeEvent, ChangeOp, CommentEdit, FollowToggleResult,
    InteractionSnapshot, LikeToggleResult, PinToggleResult, TargetKind, TargetRef, WatchScope,
};
