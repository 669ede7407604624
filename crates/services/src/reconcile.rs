use std::sync::Arc;

use quiz_core::model::{AssignmentId, QuizProgress, UserId};
use storage::repository::{
    LEGACY_DEFAULT_ASSIGNMENT, LocalMirror, RemoteProgressStore, StorageError,
};
use tracing::{debug, info, warn};

use crate::Clock;

/// Which copy of the progress aggregate became the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// Neither store had anything; the session starts from scratch.
    Empty,
    Local,
    Remote,
}

/// Outcome of reading the local mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalRead {
    Present,
    Absent,
    /// The entry existed but could not be decoded, so it was ignored.
    Corrupt,
}

/// Outcome of reading the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRead {
    Present,
    Absent,
    /// The store could not be read; healing is skipped.
    Failed,
}

/// What a reconciliation pass observed and wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub winner: Winner,
    pub local_read: LocalRead,
    pub remote_read: RemoteRead,
    /// Legacy documents written to the remote store.
    pub migrated: usize,
    /// Heal writes that succeeded.
    pub healed: usize,
    /// Heal writes that failed.
    pub failed_heals: usize,
}

impl ReconcileReport {
    /// Total remote writes issued by the pass.
    #[must_use]
    pub fn remote_writes(&self) -> usize {
        self.migrated + self.healed + self.failed_heals
    }
}

/// The reconciled aggregate plus the pass report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub progress: QuizProgress,
    pub report: ReconcileReport,
}

/// Pick the session state from the two copies.
///
/// The copy with the strictly greater `last_updated` wins; a tie goes to the
/// remote copy. With neither copy present an empty aggregate stamped `now_ms`
/// is returned.
#[must_use]
pub fn choose_winner(
    local: Option<QuizProgress>,
    remote: Option<QuizProgress>,
    now_ms: i64,
) -> (Winner, QuizProgress) {
    match (local, remote) {
        (None, None) => (Winner::Empty, QuizProgress::empty(now_ms)),
        (Some(local), None) => (Winner::Local, local),
        (None, Some(remote)) => (Winner::Remote, remote),
        (Some(local), Some(remote)) => {
            if local.is_newer_than(&remote) {
                (Winner::Local, local)
            } else {
                (Winner::Remote, remote)
            }
        }
    }
}

/// Decides the authoritative progress at login and heals the stale store.
#[derive(Clone)]
pub struct ReconciliationEngine {
    clock: Clock,
    remote: Arc<dyn RemoteProgressStore>,
    mirror: Arc<dyn LocalMirror>,
    legacy_assignment: AssignmentId,
}

impl ReconciliationEngine {
    /// Build an engine that maps a lone legacy `progress` field to the
    /// default legacy assignment.
    ///
    /// # Errors
    ///
    /// Returns `ParseIdError` only if the built-in legacy assignment id is
    /// rejected, which would be a programming error.
    pub fn new(
        clock: Clock,
        remote: Arc<dyn RemoteProgressStore>,
        mirror: Arc<dyn LocalMirror>,
    ) -> Result<Self, quiz_core::model::ParseIdError> {
        Ok(Self::with_legacy_assignment(
            clock,
            remote,
            mirror,
            AssignmentId::new(LEGACY_DEFAULT_ASSIGNMENT)?,
        ))
    }

    #[must_use]
    pub fn with_legacy_assignment(
        clock: Clock,
        remote: Arc<dyn RemoteProgressStore>,
        mirror: Arc<dyn LocalMirror>,
        legacy_assignment: AssignmentId,
    ) -> Self {
        Self {
            clock,
            remote,
            mirror,
            legacy_assignment,
        }
    }

    /// Reconcile the local mirror and the remote store for `user`.
    ///
    /// Never fails: unreadable stores count as absent (or `Failed` for the
    /// remote side) and failed heal writes are logged and counted.
    pub async fn reconcile(&self, user: &UserId) -> Reconciliation {
        let now = self.clock.now_millis();
        let (local, local_read) = self.read_local(user);
        let (remote, remote_read, migrated) = self.read_remote(user, now).await;

        let (winner, progress) = choose_winner(local, remote, now);
        debug!(
            user = %user,
            ?winner,
            ?local_read,
            ?remote_read,
            last_updated = progress.last_updated(),
            "progress reconciled"
        );

        let (healed, failed_heals) = if winner == Winner::Local {
            if remote_read == RemoteRead::Failed {
                warn!(user = %user, "remote unreadable; skipping heal of local progress");
                (0, 0)
            } else {
                self.heal_remote(user, &progress).await
            }
        } else {
            (0, 0)
        };

        Reconciliation {
            progress,
            report: ReconcileReport {
                winner,
                local_read,
                remote_read,
                migrated,
                healed,
                failed_heals,
            },
        }
    }

    fn read_local(&self, user: &UserId) -> (Option<QuizProgress>, LocalRead) {
        match self.mirror.get(user) {
            Ok(Some(progress)) => (Some(progress), LocalRead::Present),
            Ok(None) => (None, LocalRead::Absent),
            Err(StorageError::Serialization(reason)) => {
                warn!(user = %user, %reason, "ignoring corrupt local progress");
                (None, LocalRead::Corrupt)
            }
            Err(err) => {
                warn!(user = %user, error = %err, "local progress unreadable");
                (None, LocalRead::Absent)
            }
        }
    }

    async fn read_remote(
        &self,
        user: &UserId,
        now: i64,
    ) -> (Option<QuizProgress>, RemoteRead, usize) {
        let found = match self.remote.get_all(user).await {
            Ok(found) => found,
            Err(err) => {
                warn!(user = %user, error = %err, "remote progress unreadable");
                return (None, RemoteRead::Failed, 0);
            }
        };

        if let Some(progress) = found.as_ref().filter(|p| !p.is_empty()) {
            return (Some(progress.clone()), RemoteRead::Present, 0);
        }

        // No documents yet: an older client may have left progress on the
        // root record.
        let root_stamp = found
            .as_ref()
            .map(QuizProgress::last_updated)
            .filter(|stamp| *stamp > 0)
            .unwrap_or(now);
        match self.migrate_legacy(user, root_stamp).await {
            Ok(Some(migrated)) => {
                let count = migrated.assignments().len();
                (Some(migrated), RemoteRead::Present, count)
            }
            Ok(None) => (None, RemoteRead::Absent, 0),
            Err(err) => {
                warn!(user = %user, error = %err, "legacy progress migration failed");
                (None, RemoteRead::Failed, 0)
            }
        }
    }

    async fn migrate_legacy(
        &self,
        user: &UserId,
        root_stamp: i64,
    ) -> Result<Option<QuizProgress>, StorageError> {
        let Some(legacy) = self.remote.legacy_root(user).await? else {
            return Ok(None);
        };
        let documents = legacy.into_documents(&self.legacy_assignment);
        if documents.is_empty() {
            return Ok(None);
        }

        for (id, progress) in &documents {
            self.remote.put(user, id, progress).await?;
        }
        self.remote.touch_root(user, root_stamp).await?;
        info!(user = %user, documents = documents.len(), "migrated legacy progress");
        Ok(Some(QuizProgress::from_parts(documents, root_stamp)))
    }

    async fn heal_remote(&self, user: &UserId, progress: &QuizProgress) -> (usize, usize) {
        let mut healed = 0;
        let mut failed = 0;
        for (id, doc) in progress.assignments() {
            match self.remote.put(user, id, doc).await {
                Ok(()) => healed += 1,
                Err(err) => {
                    failed += 1;
                    warn!(user = %user, assignment = %id, error = %err, "heal write failed");
                }
            }
        }
        if healed > 0 {
            info!(user = %user, healed, failed, "healed remote progress from local mirror");
        }
        // The aggregate may be stamped after its newest document. Without the
        // root raised to match, the local copy would win again next login.
        if failed == 0 && !progress.assignments().is_empty() {
            if let Err(err) = self.remote.touch_root(user, progress.last_updated()).await {
                warn!(user = %user, error = %err, "raising remote root stamp failed");
            }
        }
        (healed, failed)
    }
}
