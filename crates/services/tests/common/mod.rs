#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{
    Assignment, AssignmentId, AssignmentProgress, Question, QuestionNo, QuizProgress, UserId,
};
use services::{Clock, QuizSession, ReconciliationEngine, SyncCoordinator, SyncSettings};
use storage::repository::{
    InMemoryMirror, InMemoryRemoteStore, LegacyRoot, RemoteProgressStore, StorageError,
};

pub fn user() -> UserId {
    UserId::new("u1").unwrap()
}

pub fn asgn(id: &str) -> AssignmentId {
    AssignmentId::new(id).unwrap()
}

pub fn qno(n: u32) -> QuestionNo {
    QuestionNo::new(n)
}

pub fn question(n: u32) -> Question {
    Question {
        qno: qno(n),
        question_text: format!("Question {n}"),
        options: vec!["A".into(), "B".into(), "C".into()],
        answer: "B".into(),
        hint: String::new(),
        solution: String::new(),
        page_ref: 0,
    }
}

pub fn assignment(id: &str, count: u32) -> (Assignment, Vec<Question>) {
    let assignment = Assignment::new(asgn(id), format!("Assignment {id}"), count).unwrap();
    (assignment, (1..=count).map(question).collect())
}

pub fn answered(answer: &str, stamp: i64) -> AssignmentProgress {
    let mut doc = AssignmentProgress::new();
    doc.record_answer(qno(1), answer);
    doc.with_last_updated(stamp)
}

pub fn aggregate(docs: &[(&str, AssignmentProgress)], stamp: i64) -> QuizProgress {
    QuizProgress::from_parts(
        docs.iter().map(|(id, doc)| (asgn(id), doc.clone())).collect(),
        stamp,
    )
}

/// Remote store double that records writes and can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingRemote {
    inner: InMemoryRemoteStore,
    puts: Arc<Mutex<Vec<(AssignmentId, AssignmentProgress)>>>,
    reads: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    slow_put: Arc<Mutex<Option<Duration>>>,
}

impl RecordingRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the next write take `delay` before it lands.
    pub fn slow_next_put(&self, delay: Duration) {
        *self.slow_put.lock().unwrap() = Some(delay);
    }

    pub fn puts(&self) -> Vec<(AssignmentId, AssignmentProgress)> {
        self.puts.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.puts.lock().unwrap().len()
    }

    pub fn clear_puts(&self) {
        self.puts.lock().unwrap().clear();
    }

    /// Seed a document without counting it as a write.
    pub async fn seed(&self, user: &UserId, id: &str, doc: AssignmentProgress) {
        self.inner.put(user, &asgn(id), &doc).await.unwrap();
    }

    pub fn seed_legacy(&self, user: &UserId, legacy: LegacyRoot, stamp: Option<i64>) {
        self.inner.set_legacy_root(user, legacy, stamp).unwrap();
    }

    pub async fn stored(&self, user: &UserId) -> Option<QuizProgress> {
        self.inner.get_all(user).await.unwrap()
    }
}

#[async_trait]
impl RemoteProgressStore for RecordingRemote {
    async fn get(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
    ) -> Result<Option<AssignmentProgress>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.get(user, assignment).await
    }

    async fn get_all(&self, user: &UserId) -> Result<Option<QuizProgress>, StorageError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.get_all(user).await
    }

    async fn put(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
        progress: &AssignmentProgress,
    ) -> Result<(), StorageError> {
        self.puts
            .lock()
            .unwrap()
            .push((assignment.clone(), progress.clone()));
        let delay = self.slow_put.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.put(user, assignment, progress).await
    }

    async fn touch_root(&self, user: &UserId, last_updated: i64) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.touch_root(user, last_updated).await
    }

    async fn legacy_root(&self, user: &UserId) -> Result<Option<LegacyRoot>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("offline".into()));
        }
        self.inner.legacy_root(user).await
    }
}

pub fn engine(clock: Clock, remote: &RecordingRemote, mirror: &InMemoryMirror) -> ReconciliationEngine {
    ReconciliationEngine::new(clock, Arc::new(remote.clone()), Arc::new(mirror.clone())).unwrap()
}

/// Reconcile and start a session, as a login does.
pub async fn login(
    clock: Clock,
    remote: &RecordingRemote,
    mirror: &InMemoryMirror,
) -> QuizSession {
    let reconciliation = engine(clock, remote, mirror).reconcile(&user()).await;
    let sync = SyncCoordinator::new(
        clock,
        SyncSettings::default(),
        user(),
        reconciliation.progress,
        Arc::new(remote.clone()),
        Arc::new(mirror.clone()),
    );
    QuizSession::new(sync, reconciliation.report)
}
