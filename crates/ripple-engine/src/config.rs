//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default debounce window between accepted mutations on one key.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 500;

/// Default TTL for cached collection pages and comment snapshots.
///
/// Effectively "never stale automatically": explicit broadcast/refetch is
/// the primary invalidation path, the TTL is a fallback safety net.
pub const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Default capacity of the notice broadcast channel.
pub const DEFAULT_NOTICE_CAPACITY: usize = 256;

/// Initial reconnect delay for dropped change feeds, in seconds.
pub const DEFAULT_RECONNECT_BASE_SECS: u64 = 1;

/// Reconnect delay cap, in seconds.
pub const DEFAULT_RECONNECT_MAX_SECS: u64 = 60;

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The viewing user all mutations are issued as.
    pub user_id: String,
    /// Directory for the persistent snapshot cache.
    pub cache_dir: PathBuf,
    /// Debounce window between accepted mutations on one key.
    pub min_interval: Duration,
    /// TTL for cached collection pages.
    pub collection_ttl: Duration,
    /// TTL for cached comment snapshots.
    pub comments_ttl: Duration,
    /// Capacity of the notice broadcast channel.
    pub notice_capacity: usize,
    /// Initial change-feed reconnect delay in seconds.
    pub reconnect_base_secs: u64,
    /// Change-feed reconnect delay cap in seconds.
    pub reconnect_max_secs: u64,
}

impl EngineConfig {
    /// Config with default tuning for the given user and cache directory.
    pub fn new(user_id: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_id: user_id.into(),
            cache_dir: cache_dir.into(),
            min_interval: Duration::from_millis(DEFAULT_MIN_INTERVAL_MS),
            collection_ttl: Duration::from_secs(DEFAULT_SNAPSHOT_TTL_SECS),
            comments_ttl: Duration::from_secs(DEFAULT_SNAPSHOT_TTL_SECS),
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            reconnect_base_secs: DEFAULT_RECONNECT_BASE_SECS,
            reconnect_max_secs: DEFAULT_RECONNECT_MAX_SECS,
        }
    }
}
