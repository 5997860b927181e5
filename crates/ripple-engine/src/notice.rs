//! User-visible failure signals.

use tokio::sync::broadcast;
use tracing::trace;

use ripple_service::WatchScope;

use crate::guard::ActionKind;

/// A non-exceptional signal for the presentation layer.
///
/// Failures never escape a mutation flow as errors; they land here so the
/// UI can show a toast or dialog while the engine has already restored a
/// consistent state.
#[derive(Debug, Clone)]
pub enum Notice {
    /// A mutation hit a transient failure and was rolled back. Shown as a
    /// non-blocking toast; the next tap re-attempts.
    ActionFailed {
        action: ActionKind,
        target_id: String,
        message: String,
    },
    /// A mutation was rejected outright (e.g. the target no longer
    /// exists). No state was applied; shown as an explicit dialog.
    ActionRejected {
        action: ActionKind,
        target_id: String,
        message: String,
    },
    /// A realtime-driven reconciliation failed after reconnect.
    SyncFailed { scope: WatchScope, message: String },
}

/// Handle for emitting and subscribing to notices.
#[derive(Clone)]
pub struct Notices {
    tx: broadcast::Sender<Notice>,
}

impl Notices {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Emit a notice; with no mounted subscribers this is a no-op.
    pub fn emit(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            trace!("no subscribers for notice");
        }
    }
}
