//! Error types for the remote feed service.

use thiserror::Error;

/// Errors surfaced by [`FeedService`](crate::FeedService) operations.
///
/// The variants map one-to-one onto the engine's recovery policies: a
/// `Transient` failure rolls the optimistic mutation back, a `Validation`
/// failure is surfaced to the user without applying state, and a dropped
/// change feed is resynced silently on reconnect.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The remote call failed or timed out; retrying later may succeed.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// The mutation was rejected, e.g. the target no longer exists.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The realtime change feed disconnected.
    #[error("change feed dropped: {0}")]
    SubscriptionDropped(String),
}
