//! Post-commit side effects.
//!
//! Command handlers enqueue effects after their journal write succeeds. A single
//! background worker delivers them in order. Each delivery runs under its own
//! timeout and panic boundary, and its outcome never reaches the command.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::audit::{ActivityRecord, AuditSink};
use crate::notify::{Notification, Notifier};

#[derive(Debug)]
pub struct EffectError(pub String);

impl fmt::Display for EffectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for EffectError {}

#[derive(Debug, Clone)]
pub enum SideEffect {
    Notify(Notification),
    Audit(ActivityRecord),
    RoomClosed(Ulid),
}

impl SideEffect {
    fn label(&self) -> &'static str {
        match self {
            SideEffect::Notify(_) => "notify",
            SideEffect::Audit(_) => "audit",
            SideEffect::RoomClosed(_) => "room_closed",
        }
    }
}

/// Handle for enqueueing side effects. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<SideEffect>,
}

impl Dispatcher {
    /// Spawn the delivery worker. Must be called inside a tokio runtime.
    pub fn spawn(
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        queue: usize,
        timeout: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue.max(1));
        tokio::spawn(effect_worker_loop(rx, notifier, audit, timeout));
        Self { tx }
    }

    /// Enqueue without waiting. A full or closed queue drops the effect.
    pub fn dispatch(&self, effect: SideEffect) {
        let label = effect.label();
        if let Err(e) = self.tx.try_send(effect) {
            warn!(effect = label, "side effect dropped: {e}");
            metrics::counter!(crate::observability::EFFECTS_DROPPED_TOTAL, "effect" => label)
                .increment(1);
        }
    }

    pub fn notify(&self, notification: Notification) {
        self.dispatch(SideEffect::Notify(notification));
    }

    pub fn audit(&self, record: ActivityRecord) {
        self.dispatch(SideEffect::Audit(record));
    }

    /// Queued behind the room's earlier notifications, so those still go out.
    pub fn room_closed(&self, room_id: Ulid) {
        self.dispatch(SideEffect::RoomClosed(room_id));
    }
}

async fn effect_worker_loop(
    mut rx: mpsc::Receiver<SideEffect>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    timeout: Duration,
) {
    while let Some(effect) = rx.recv().await {
        let label = effect.label();
        let delivery = async {
            match effect {
                SideEffect::Notify(n) => notifier.notify(n).await,
                SideEffect::Audit(r) => audit.record(r).await,
                SideEffect::RoomClosed(id) => notifier.room_closed(id).await,
            }
        };
        let outcome = tokio::time::timeout(timeout, AssertUnwindSafe(delivery).catch_unwind()).await;
        let failure = match outcome {
            Ok(Ok(Ok(()))) => {
                debug!(effect = label, "side effect delivered");
                continue;
            }
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(_)) => "panicked".to_string(),
            Err(_) => format!("timed out after {timeout:?}"),
        };
        warn!(effect = label, "side effect failed: {failure}");
        metrics::counter!(crate::observability::EFFECTS_FAILED_TOTAL, "effect" => label).increment(1);
    }
}
