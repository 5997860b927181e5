//! Explicit session context: construction on sign-in, teardown on
//! sign-out, no ambient global state.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{info, warn};

use ripple_cache::{CacheInvalidator, CacheUpdate, CollectionCache, PersistentCache};
use ripple_service::{FeedItem, FeedService, TargetRef, WatchScope};

use crate::bridge::{RealtimeBridge, ReconcileFn, SubscriptionHandle};
use crate::comments::CommentThread;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::guard::MutationGuard;
use crate::interactions::InteractionEngine;
use crate::notice::{Notice, Notices};
use crate::store::OptimisticStore;

/// One signed-in user's interaction engine and caches.
///
/// All shared state hangs off this context; components receive their
/// dependencies explicitly at construction. `teardown` shuts down
/// realtime subscriptions and drops both cache layers along with all
/// optimistic state.
pub struct Session {
    config: EngineConfig,
    service: Arc<dyn FeedService>,
    guard: MutationGuard,
    store: Arc<OptimisticStore>,
    collections: Arc<CollectionCache>,
    persistent: Arc<PersistentCache>,
    invalidator: CacheInvalidator,
    notices: Notices,
    interactions: InteractionEngine,
    bridge: RealtimeBridge,
    subscriptions: Mutex<Vec<SubscriptionHandle>>,
}

impl Session {
    /// Build a session for the configured user on top of the given
    /// service. Creates the persistent cache directory.
    pub fn new(
        config: EngineConfig,
        service: Arc<dyn FeedService>,
    ) -> Result<Arc<Self>, EngineError> {
        let persistent = PersistentCache::new(&config.cache_dir)?;
        let collections = Arc::new(CollectionCache::new());
        let invalidator = CacheInvalidator::new(Arc::clone(&collections));
        let guard = MutationGuard::new(config.min_interval);
        let store = Arc::new(OptimisticStore::new());
        let notices = Notices::new(config.notice_capacity);

        let interactions = InteractionEngine::new(
            config.user_id.clone(),
            Arc::clone(&service),
            guard.clone(),
            Arc::clone(&store),
            invalidator.clone(),
            notices.clone(),
        );
        let bridge = RealtimeBridge::new(
            Arc::clone(&service),
            guard.clone(),
            notices.clone(),
            config.reconnect_base_secs,
            config.reconnect_max_secs,
        );

        info!(user = %config.user_id, "session initialized");
        Ok(Arc::new(Self {
            config,
            service,
            guard,
            store,
            collections,
            persistent,
            invalidator,
            notices,
            interactions,
            bridge,
            subscriptions: Mutex::new(Vec::new()),
        }))
    }

    /// The like/save/follow flows.
    pub fn interactions(&self) -> &InteractionEngine {
        &self.interactions
    }

    /// The in-memory collection pages.
    pub fn collections(&self) -> &Arc<CollectionCache> {
        &self.collections
    }

    /// The persistent snapshot cache.
    pub fn persistent(&self) -> &Arc<PersistentCache> {
        &self.persistent
    }

    /// The cross-view patch broadcaster.
    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    /// The per-key mutation guard.
    pub fn guard(&self) -> &MutationGuard {
        &self.guard
    }

    /// Subscribe to user-visible failure signals.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Subscribe to collection cache updates.
    pub fn updates(&self) -> broadcast::Receiver<CacheUpdate> {
        self.collections.subscribe()
    }

    /// Load a collection page through the persistent cache and install it
    /// as a live page.
    #[tracing::instrument(skip(self))]
    pub async fn load_collection(&self, key: &str) -> Result<Vec<FeedItem>, EngineError> {
        let service = Arc::clone(&self.service);
        let collection_key = key.to_string();
        let items: Vec<FeedItem> = self
            .persistent
            .read_through(
                &format!("collection:{key}"),
                self.config.collection_ttl,
                move || async move { service.read_collection(&collection_key).await },
            )
            .await?;
        self.collections.put_page(key, items.clone());
        Ok(items)
    }

    /// Open a comment thread for an entity.
    pub fn comment_thread(&self, entity: TargetRef) -> Arc<CommentThread> {
        Arc::new(CommentThread::new(
            entity,
            self.config.user_id.clone(),
            Arc::clone(&self.service),
            self.guard.clone(),
            Arc::clone(&self.store),
            self.invalidator.clone(),
            Arc::clone(&self.persistent),
            self.notices.clone(),
            self.config.comments_ttl,
        ))
    }

    /// Watch a thread's entity on the realtime change feed; events drive
    /// `CommentThread::refresh`.
    pub fn watch_comments(&self, thread: &Arc<CommentThread>) {
        let scope = WatchScope::new(thread.entity().kind, thread.entity().id.clone());
        let thread = Arc::clone(thread);
        let reconcile: ReconcileFn = Arc::new(move || {
            let thread = Arc::clone(&thread);
            Box::pin(async move { thread.refresh().await })
        });
        self.watch(scope, reconcile);
    }

    /// Open a subscription with an arbitrary reconcile callback and keep
    /// its handle for teardown.
    pub fn watch(&self, scope: WatchScope, reconcile: ReconcileFn) {
        let handle = self.bridge.subscribe(scope, reconcile);
        match self.subscriptions.lock() {
            Ok(mut subs) => subs.push(handle),
            Err(_) => warn!("subscription registry poisoned, dropping handle"),
        }
    }

    /// Sign-out: stop realtime subscriptions, drop caches and optimistic
    /// state.
    pub async fn teardown(&self) {
        let handles: Vec<SubscriptionHandle> = match self.subscriptions.lock() {
            Ok(mut subs) => subs.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            handle.shutdown().await;
        }
        self.store.clear();
        self.collections.clear();
        self.persistent.clear();
        info!(user = %self.config.user_id, "session torn down");
    }
}
