//! Error types for the interaction engine.

use thiserror::Error;

use ripple_cache::CacheError;
use ripple_service::ServiceError;

/// Errors that can escape engine entry points.
///
/// Mutation flows never return these — rollback and reconcile resolve
/// inside the flow and failures surface as notices. Load and refresh
/// paths, which have no optimistic state to fall back on, do propagate.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Remote service call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Persistent cache I/O failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
