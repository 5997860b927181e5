//! Disk-backed snapshot cache with TTL freshness.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::CacheError;

/// On-disk envelope around a cached payload.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    payload: serde_json::Value,
    written_at: DateTime<Utc>,
    ttl_secs: u64,
}

/// A cache hit: the raw payload plus whether it is still within its TTL.
#[derive(Debug, Clone)]
pub struct CachedBlob {
    pub payload: serde_json::Value,
    pub written_at: DateTime<Utc>,
    pub fresh: bool,
}

/// Keyed, TTL-bounded store of serialized snapshots.
///
/// Keys are namespaced strings (`comments:post:42`); each key maps to one
/// JSON file under the cache directory. TTL expiry only downgrades an
/// entry to stale — explicit invalidation and refetch are the primary
/// paths, the TTL is a fallback safety net. A corrupted file is cleared
/// and reported as a miss rather than an error.
pub struct PersistentCache {
    dir: PathBuf,
}

impl PersistentCache {
    /// Open a cache rooted at the given directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Arc<Self>, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Arc::new(Self { dir }))
    }

    /// Open a cache in a fresh temp directory.
    pub fn new_temp() -> Result<Arc<Self>, CacheError> {
        let temp_dir = tempfile::tempdir()?;
        Self::new(temp_dir.keep())
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | ':' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }

    /// Read an entry. Returns `None` for a miss; corrupted entries are
    /// cleared and count as misses.
    pub fn get(&self, key: &str) -> Option<CachedBlob> {
        let path = self.file_for(key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(_) => return None,
        };
        match serde_json::from_slice::<Envelope>(&raw) {
            Ok(envelope) => {
                let age = Utc::now().signed_duration_since(envelope.written_at);
                let fresh = age.num_seconds() >= 0
                    && (age.num_seconds() as u64) < envelope.ttl_secs;
                trace!(key, fresh, "cache hit");
                Some(CachedBlob {
                    payload: envelope.payload,
                    written_at: envelope.written_at,
                    fresh,
                })
            }
            Err(e) => {
                warn!(key, error = %e, "corrupted cache entry, clearing");
                let _ = std::fs::remove_file(&path);
                None
            }
        }
    }

    /// Read an entry decoded into `T`. A payload that no longer matches
    /// the expected shape is treated like corruption: cleared, miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<(T, bool)> {
        let blob = self.get(key)?;
        match serde_json::from_value(blob.payload) {
            Ok(value) => Some((value, blob.fresh)),
            Err(e) => {
                warn!(key, error = %e, "cache entry shape mismatch, clearing");
                self.remove(key);
                None
            }
        }
    }

    /// Write an entry with the given TTL.
    pub fn set<T: Serialize>(&self, key: &str, payload: &T, ttl: Duration) -> Result<(), CacheError> {
        let envelope = Envelope {
            payload: serde_json::to_value(payload)?,
            written_at: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };
        std::fs::write(self.file_for(key), serde_json::to_vec(&envelope)?)?;
        trace!(key, ttl_secs = envelope.ttl_secs, "cache entry written");
        Ok(())
    }

    /// Remove one entry.
    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.file_for(key));
    }

    /// Remove every entry.
    pub fn clear(&self) {
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let _ = std::fs::remove_file(entry.path());
            }
        }
        debug!(dir = %self.dir.display(), "persistent cache cleared");
    }

    /// Read-through: serve a fresh entry immediately (refreshing it in the
    /// background), otherwise fetch; on fetch failure fall back to the
    /// last-known stale entry, and only error when nothing is cached.
    pub async fn read_through<T, E, F, Fut>(
        self: &Arc<Self>,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cached = self.get_as::<T>(key);

        if let Some((value, true)) = cached {
            // Fresh: serve immediately, refresh underneath.
            let cache = Arc::clone(self);
            let key = key.to_string();
            let fut = fetch();
            tokio::spawn(async move {
                match fut.await {
                    Ok(latest) => {
                        if let Err(e) = cache.set(&key, &latest, ttl) {
                            warn!(key, error = %e, "background refresh write failed");
                        }
                    }
                    Err(e) => debug!(key, error = %e, "background refresh fetch failed"),
                }
            });
            return Ok(value);
        }

        match fetch().await {
            Ok(latest) => {
                if let Err(e) = self.set(key, &latest, ttl) {
                    warn!(key, error = %e, "cache write failed");
                }
                Ok(latest)
            }
            Err(e) => match cached {
                Some((stale, _)) => {
                    warn!(key, error = %e, "fetch failed, serving stale cache entry");
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn set_then_get_is_fresh() {
        let cache = PersistentCache::new_temp().unwrap();
        cache
            .set("comments:post:42", &vec!["a", "b"], Duration::from_secs(60))
            .unwrap();

        let (value, fresh) = cache.get_as::<Vec<String>>("comments:post:42").unwrap();
        assert!(fresh);
        assert_eq!(value, vec!["a", "b"]);
    }

    #[test]
    fn zero_ttl_entries_are_stale_but_served() {
        let cache = PersistentCache::new_temp().unwrap();
        cache.set("k", &1u32, Duration::from_secs(0)).unwrap();

        let (value, fresh) = cache.get_as::<u32>("k").unwrap();
        assert!(!fresh);
        assert_eq!(value, 1);
    }

    #[test]
    fn corrupted_entries_are_cleared() {
        let cache = PersistentCache::new_temp().unwrap();
        cache.set("bad", &1u32, Duration::from_secs(60)).unwrap();

        // Scribble over the file on disk.
        let path = cache.dir().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(cache.get("bad").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn shape_mismatch_counts_as_corruption() {
        let cache = PersistentCache::new_temp().unwrap();
        cache.set("k", &"a string", Duration::from_secs(60)).unwrap();

        assert!(cache.get_as::<u64>("k").is_none());
        assert!(cache.get("k").is_none());
    }

    #[tokio::test]
    async fn read_through_fetches_on_miss() {
        let cache = PersistentCache::new_temp().unwrap();
        let value: Result<u32, String> = cache
            .read_through("k", Duration::from_secs(60), || async { Ok(7u32) })
            .await;
        assert_eq!(value.unwrap(), 7);
        // And the fetched value was written back.
        assert_eq!(cache.get_as::<u32>("k").unwrap().0, 7);
    }

    #[tokio::test]
    async fn read_through_serves_stale_on_fetch_failure() {
        let cache = PersistentCache::new_temp().unwrap();
        cache.set("k", &3u32, Duration::from_secs(0)).unwrap();

        let value: Result<u32, String> = cache
            .read_through("k", Duration::from_secs(60), || async {
                Err("network down".to_string())
            })
            .await;
        assert_eq!(value.unwrap(), 3);
    }

    #[tokio::test]
    async fn read_through_errors_when_nothing_cached() {
        let cache = PersistentCache::new_temp().unwrap();
        let value: Result<u32, String> = cache
            .read_through("k", Duration::from_secs(60), || async {
                Err("network down".to_string())
            })
            .await;
        assert_eq!(value.unwrap_err(), "network down");
    }

    #[tokio::test]
    async fn read_through_serves_fresh_and_refreshes_behind() {
        let cache = PersistentCache::new_temp().unwrap();
        cache.set("k", &1u32, Duration::from_secs(60)).unwrap();

        let value: Result<u32, String> = cache
            .read_through("k", Duration::from_secs(60), || async { Ok(2u32) })
            .await;
        // The stale-free cached value is served synchronously...
        assert_eq!(value.unwrap(), 1);

        // ...and the background refresh lands eventually.
        tokio::task::yield_now().await;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            if cache.get_as::<u32>("k").map(|(v, _)| v) == Some(2) {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "refresh never landed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
