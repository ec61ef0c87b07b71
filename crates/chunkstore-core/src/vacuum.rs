//! Background TTL vacuum task (spec.md §4.3, §5).
//!
//! Feature-gated behind `vacuum` (on by default): a deployment that brings
//! its own scheduler, or none at all, can disable the feature and call
//! [`Collection::vacuum_expired`] on whatever cadence it prefers instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::collection::Collection;

/// A running vacuum task.
///
/// Dropping the handle without calling [`Self::stop`] leaves the task
/// running until the owning Tokio runtime shuts down; spec.md §5 notes
/// the vacuum task "stops when its driving cancellation signal fires" —
/// [`Self::stop`] is that signal.
pub struct VacuumHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl VacuumHandle {
    /// Signals the vacuum loop to stop and waits for its current sweep (if
    /// any) to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }
}

/// Spawns a task that calls [`Collection::vacuum_expired`] every `period`
/// until [`VacuumHandle::stop`] is called.
///
/// Requires a Tokio runtime to already be running on the calling thread.
/// A `period` of zero is rejected at the call site by
/// `CollectionOptions`/`ChunkStoreConfig`, not here; callers that want no
/// sweep simply don't spawn one.
#[must_use]
pub fn spawn(collection: Arc<Collection>, period: Duration) -> VacuumHandle {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match collection.vacuum_expired() {
                        Ok(()) => tracing::debug!(collection = collection.name(), "vacuum sweep completed"),
                        Err(err) => tracing::warn!(collection = collection.name(), %err, "vacuum sweep failed"),
                    }
                }
                _ = &mut stop_rx => {
                    tracing::debug!(collection = collection.name(), "vacuum task stopping");
                    break;
                }
            }
        }
    });
    VacuumHandle { stop: Some(stop_tx), task }
}
