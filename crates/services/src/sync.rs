use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quiz_core::model::{AssignmentId, AssignmentProgress, QuizProgress, UserId};
use storage::repository::{LocalMirror, RemoteProgressStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::Clock;

/// Default quiet period before a remote write fires.
pub const SYNC_DEBOUNCE_MS: u64 = 5_000;

/// Tuning for the debounced remote writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce: Duration,
}

impl SyncSettings {
    #[must_use]
    pub fn with_debounce(debounce: Duration) -> Self {
        Self { debounce }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::with_debounce(Duration::from_millis(SYNC_DEBOUNCE_MS))
    }
}

/// Whether remote writes are outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Synced,
    /// A remote write is scheduled or in flight.
    Syncing,
}

struct PendingWrite {
    generation: u64,
    snapshot: AssignmentProgress,
    handle: JoinHandle<()>,
}

type PendingMap = HashMap<AssignmentId, PendingWrite>;

/// One lock per assignment; a write holds it until its `put` returns.
type WriteLocks = HashMap<AssignmentId, Arc<tokio::sync::Mutex<()>>>;

/// State shared between the coordinator and its timer tasks.
struct SyncShared {
    user: UserId,
    remote: Arc<dyn RemoteProgressStore>,
    pending: Mutex<PendingMap>,
    write_locks: Mutex<WriteLocks>,
    in_flight: AtomicUsize,
    next_generation: AtomicU64,
    status: watch::Sender<SyncStatus>,
}

impl SyncShared {
    fn lock_pending(&self) -> MutexGuard<'_, PendingMap> {
        // The map holds no invariant a panicking holder could break.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, pending: &PendingMap) {
        let next = if pending.is_empty() && self.in_flight.load(Ordering::SeqCst) == 0 {
            SyncStatus::Synced
        } else {
            SyncStatus::Syncing
        };
        self.status.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }

    fn publish_locked(&self) {
        let pending = self.lock_pending();
        self.publish(&pending);
    }

    /// Timer body: write the snapshot unless a newer edit superseded it.
    async fn fire(&self, assignment: &AssignmentId, generation: u64) {
        let snapshot = {
            let mut pending = self.lock_pending();
            let current = pending
                .get(assignment)
                .is_some_and(|entry| entry.generation == generation);
            if !current {
                return;
            }
            let Some(entry) = pending.remove(assignment) else {
                return;
            };
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            self.publish(&pending);
            entry.snapshot
        };
        self.write(assignment, &snapshot).await;
    }

    fn write_lock(&self, assignment: &AssignmentId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.write_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(assignment.clone()).or_default())
    }

    /// Issue one remote write. The caller has already counted it in flight.
    ///
    /// Writes of one assignment land in the order they were issued: a write
    /// waits until the previous write of the same assignment has returned.
    async fn write(&self, assignment: &AssignmentId, snapshot: &AssignmentProgress) {
        let lock = self.write_lock(assignment);
        let _turn = lock.lock().await;
        match self.remote.put(&self.user, assignment, snapshot).await {
            Ok(()) => debug!(
                user = %self.user,
                assignment = %assignment,
                last_updated = snapshot.last_updated(),
                "remote progress written"
            ),
            Err(err) => warn!(
                user = %self.user,
                assignment = %assignment,
                error = %err,
                "remote progress write failed"
            ),
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.publish_locked();
    }
}

/// Owns a user's in-memory progress and propagates every change.
///
/// Each mutation is written to the local mirror immediately. The remote
/// write for the touched assignment is debounced: further edits within the
/// window restart the timer and only the latest snapshot is written.
/// Timers of different assignments run independently.
pub struct SyncCoordinator {
    clock: Clock,
    settings: SyncSettings,
    mirror: Arc<dyn LocalMirror>,
    shared: Arc<SyncShared>,
    state: QuizProgress,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: SyncSettings,
        user: UserId,
        state: QuizProgress,
        remote: Arc<dyn RemoteProgressStore>,
        mirror: Arc<dyn LocalMirror>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Synced);
        Self {
            clock,
            settings,
            mirror,
            shared: Arc::new(SyncShared {
                user,
                remote,
                pending: Mutex::new(HashMap::new()),
                write_locks: Mutex::new(HashMap::new()),
                in_flight: AtomicUsize::new(0),
                next_generation: AtomicU64::new(0),
                status,
            }),
            state,
        }
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.shared.user
    }

    #[must_use]
    pub fn progress(&self) -> &QuizProgress {
        &self.state
    }

    #[must_use]
    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Subscribe to sync status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.shared.status.subscribe()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        *self.shared.status.borrow() == SyncStatus::Syncing
    }

    /// Number of assignments with a scheduled remote write.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.lock_pending().len()
    }

    /// Apply a new assignment snapshot.
    ///
    /// Stamps it, merges it into the aggregate, writes the whole aggregate
    /// to the local mirror and reschedules the assignment's remote write.
    /// Returns the stamped snapshot. Mirror failures are logged only.
    pub fn record_mutation(
        &mut self,
        assignment: AssignmentId,
        progress: AssignmentProgress,
    ) -> AssignmentProgress {
        let stamped = self.stamp(assignment.clone(), progress);
        if let Err(err) = self.mirror.put(&self.shared.user, &self.state) {
            warn!(user = %self.shared.user, error = %err, "local mirror write failed");
        }
        self.schedule(assignment, stamped.clone());
        stamped
    }

    /// Apply a reset snapshot.
    ///
    /// Same as `record_mutation`, except that the local mirror entry is
    /// erased instead of rewritten; the next mutation recreates it.
    pub fn record_reset(
        &mut self,
        assignment: AssignmentId,
        progress: AssignmentProgress,
    ) -> AssignmentProgress {
        let stamped = self.stamp(assignment.clone(), progress);
        if let Err(err) = self.mirror.delete(&self.shared.user) {
            warn!(user = %self.shared.user, error = %err, "local mirror erase failed");
        }
        self.schedule(assignment, stamped.clone());
        stamped
    }

    /// Abandon every scheduled remote write without issuing it.
    ///
    /// Writes already in flight complete on their own. Returns the number of
    /// abandoned writes.
    pub fn cancel_pending(&self) -> usize {
        let mut pending = self.shared.lock_pending();
        let abandoned = pending.len();
        for (_, entry) in pending.drain() {
            entry.handle.abort();
        }
        self.shared.publish(&pending);
        if abandoned > 0 {
            debug!(user = %self.shared.user, abandoned, "pending remote writes cancelled");
        }
        abandoned
    }

    /// Issue every scheduled remote write now and wait for all of them.
    pub async fn flush(&self) {
        let drained: Vec<(AssignmentId, AssignmentProgress)> = {
            let mut pending = self.shared.lock_pending();
            let drained: Vec<_> = pending
                .drain()
                .map(|(id, entry)| {
                    entry.handle.abort();
                    (id, entry.snapshot)
                })
                .collect();
            self.shared
                .in_flight
                .fetch_add(drained.len(), Ordering::SeqCst);
            self.shared.publish(&pending);
            drained
        };
        for (id, snapshot) in &drained {
            self.shared.write(id, snapshot).await;
        }
    }

    fn stamp(
        &mut self,
        assignment: AssignmentId,
        progress: AssignmentProgress,
    ) -> AssignmentProgress {
        let now = self.clock.now_millis();
        self.state.record(assignment, progress, now).clone()
    }

    fn schedule(&self, assignment: AssignmentId, snapshot: AssignmentProgress) {
        let generation = self.shared.next_generation.fetch_add(1, Ordering::SeqCst);
        let delay = self.settings.debounce;

        let mut pending = self.shared.lock_pending();
        if let Some(previous) = pending.remove(&assignment) {
            previous.handle.abort();
        }
        let shared = Arc::clone(&self.shared);
        let timer_id = assignment.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(&timer_id, generation).await;
        });
        pending.insert(
            assignment,
            PendingWrite {
                generation,
                snapshot,
                handle,
            },
        );
        self.shared.publish(&pending);
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
