//! Error types for the cache layers.

use thiserror::Error;

/// Errors from persistent cache I/O.
///
/// Corruption is intentionally absent: an unparseable entry is cleared and
/// reported as a miss, never surfaced as an error.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem operation failed.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload could not be serialized for writing.
    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
