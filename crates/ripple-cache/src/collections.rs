//! In-memory collection pages shared across mounted views.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use ripple_service::{FeedItem, InteractionSnapshot};

/// Broadcast channel capacity for view updates. Set high enough that a
/// burst of patches during reconciliation does not lag subscribers.
const UPDATE_CHANNEL_CAPACITY: usize = 4096;

/// Update event for mounted views subscribed to the collection cache.
#[derive(Debug, Clone)]
pub enum CacheUpdate {
    /// One item's interaction fields changed inside a collection.
    ItemPatched {
        collection: String,
        entity_id: String,
        interaction: InteractionSnapshot,
    },
    /// A whole page was replaced (load or reconciliation).
    PageReplaced { collection: String },
    /// A page was evicted.
    PageRemoved { collection: String },
    /// Everything was dropped (sign-out).
    Cleared,
}

/// Process-wide store of collection pages keyed by collection key
/// (`feed:home:1`, `feed:profile:alice`, `saved:me`, ...).
///
/// Views render straight from these pages; every mutation of interaction
/// fields goes through [`CacheInvalidator`](crate::CacheInvalidator), which
/// is what keeps different views of the same entity coherent.
pub struct CollectionCache {
    pages: DashMap<String, Vec<FeedItem>>,
    updates_tx: broadcast::Sender<CacheUpdate>,
}

impl CollectionCache {
    pub fn new() -> Self {
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            pages: DashMap::new(),
            updates_tx,
        }
    }

    /// Subscribe to view updates.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheUpdate> {
        self.updates_tx.subscribe()
    }

    /// Store or replace a page.
    pub fn put_page(&self, key: impl Into<String>, items: Vec<FeedItem>) {
        let key = key.into();
        self.pages.insert(key.clone(), items);
        self.broadcast(CacheUpdate::PageReplaced { collection: key });
    }

    /// Read a page.
    pub fn page(&self, key: &str) -> Option<Vec<FeedItem>> {
        self.pages.get(key).map(|p| p.value().clone())
    }

    /// Evict a page (view unmount does not evict; explicit eviction only).
    pub fn remove_page(&self, key: &str) {
        if self.pages.remove(key).is_some() {
            self.broadcast(CacheUpdate::PageRemoved {
                collection: key.to_string(),
            });
        }
    }

    /// Number of cached pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Drop every page (sign-out).
    pub fn clear(&self) {
        self.pages.clear();
        self.broadcast(CacheUpdate::Cleared);
        debug!("collection cache cleared");
    }

    /// Visit every page mutably; used by the invalidator's structural scan.
    pub(crate) fn for_each_page_mut(&self, mut f: impl FnMut(&str, &mut Vec<FeedItem>)) {
        for mut entry in self.pages.iter_mut() {
            let key = entry.key().clone();
            f(&key, entry.value_mut());
        }
    }

    /// Send an update; with no mounted subscribers this is a no-op.
    pub(crate) fn broadcast(&self, update: CacheUpdate) {
        if self.updates_tx.send(update).is_err() {
            trace!("no subscribers for collection cache update");
        }
    }
}

impl Default for CollectionCache {
    fn default() -> Self {
        Self::new()
    }
}
