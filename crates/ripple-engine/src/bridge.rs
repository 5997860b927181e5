//! Realtime change-feed subscriptions with deferred reconciliation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ripple_service::{ChangeFeed, FeedService, WatchScope};

use crate::error::EngineError;
use crate::notice::{Notice, Notices};
use crate::guard::MutationGuard;

/// Type alias for the reconciliation callback a subscription drives.
pub type ReconcileFn = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>> + Send + Sync,
>;

/// Handle to one live subscription. Dropping it tears the worker down.
pub struct SubscriptionHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Signal shutdown and wait for the worker to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Subscribes to remote change feeds and triggers reconciliation fetches,
/// independent of the mutation path.
///
/// Every event for the watched scope triggers the reconcile callback —
/// unless a mutation against the scoped entity is currently pending, in
/// which case the refresh is deferred until the guard announces the key's
/// release, so the pre-optimistic value never flashes. Reconnects back
/// off exponentially and re-issue a one-shot reconciliation rather than
/// assuming no events were missed.
#[derive(Clone)]
pub struct RealtimeBridge {
    service: Arc<dyn FeedService>,
    guard: MutationGuard,
    notices: Notices,
    reconnect_base_secs: u64,
    reconnect_max_secs: u64,
}

impl RealtimeBridge {
    pub(crate) fn new(
        service: Arc<dyn FeedService>,
        guard: MutationGuard,
        notices: Notices,
        reconnect_base_secs: u64,
        reconnect_max_secs: u64,
    ) -> Self {
        Self {
            service,
            guard,
            notices,
            reconnect_base_secs,
            reconnect_max_secs,
        }
    }

    /// Open a subscription for the scope. The returned handle owns the
    /// worker task; release it when the owning view is torn down.
    pub fn subscribe(&self, scope: WatchScope, reconcile: ReconcileFn) -> SubscriptionHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = BridgeWorker {
            service: Arc::clone(&self.service),
            guard: self.guard.clone(),
            notices: self.notices.clone(),
            scope,
            reconcile,
            reconnect_base_secs: self.reconnect_base_secs,
            reconnect_max_secs: self.reconnect_max_secs,
        };
        let task = tokio::spawn(async move { worker.run(shutdown_rx).await });
        SubscriptionHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

struct BridgeWorker {
    service: Arc<dyn FeedService>,
    guard: MutationGuard,
    notices: Notices,
    scope: WatchScope,
    reconcile: ReconcileFn,
    reconnect_base_secs: u64,
    reconnect_max_secs: u64,
}

impl BridgeWorker {
    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut backoff_secs = self.reconnect_base_secs;
        let mut first_connect = true;

        loop {
            if *shutdown_rx.borrow() {
                info!(scope = %self.scope, "bridge worker shutting down");
                return;
            }

            match self.service.subscribe_changes(self.scope.clone()).await {
                Ok(feed) => {
                    debug!(scope = %self.scope, "change feed connected");
                    backoff_secs = self.reconnect_base_secs;
                    if !first_connect {
                        // The feed was down; resync rather than assuming
                        // no events were missed.
                        self.refresh(&mut shutdown_rx).await;
                    }
                    first_connect = false;

                    if self.consume(feed, &mut shutdown_rx).await {
                        return;
                    }
                }
                Err(e) => {
                    warn!(scope = %self.scope, error = %e, "change feed connect failed");
                }
            }

            let wait = Duration::from_secs(backoff_secs);
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
            backoff_secs = (backoff_secs * 2).min(self.reconnect_max_secs);
        }
    }

    /// Process events until shutdown (true) or disconnect (false).
    async fn consume(&self, mut feed: ChangeFeed, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return true;
                    }
                }

                event = feed.recv() => match event {
                    Some(event) => {
                        trace!(scope = %self.scope, op = ?event.op, row = %event.row_id, "change event");
                        self.refresh(shutdown_rx).await;
                    }
                    None => {
                        warn!(scope = %self.scope, "change feed dropped, reconnecting");
                        return false;
                    }
                }
            }
        }
    }

    /// Run the reconcile callback, deferring while a mutation against the
    /// scoped entity is in flight.
    async fn refresh(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        if self.guard.pending_for_target(&self.scope.entity_id) {
            debug!(scope = %self.scope, "deferring refresh until pending mutation resolves");
            let mut releases = self.guard.subscribe_releases();
            while self.guard.pending_for_target(&self.scope.entity_id) {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                    release = releases.recv() => match release {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        if let Err(e) = (self.reconcile)().await {
            warn!(scope = %self.scope, error = %e, "reconciliation failed");
            self.notices.emit(Notice::SyncFailed {
                scope: self.scope.clone(),
                message: e.to_string(),
            });
        }
    }
}
