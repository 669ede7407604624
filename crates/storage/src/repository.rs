use async_trait::async_trait;
use quiz_core::model::{
    Assignment, AssignmentId, AssignmentProgress, Question, QuizProgress, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

/// Key prefix for local mirror entries; the user id is appended.
pub const MIRROR_KEY_PREFIX: &str = "quiz_progress_v3_";

/// Build the local mirror key for a user.
#[must_use]
pub fn mirror_key(user: &UserId) -> String {
    format!("{MIRROR_KEY_PREFIX}{user}")
}

//
// ─── LEGACY ROOT RECORD ───────────────────────────────────────────────────────
//

/// Assignment that a legacy single `progress` field belonged to.
pub const LEGACY_DEFAULT_ASSIGNMENT: &str = "salt-analysis1";

/// Progress fields kept directly on the user root record by older clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRoot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<BTreeMap<AssignmentId, AssignmentProgress>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<AssignmentProgress>,
}

impl LegacyRoot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_none() && self.progress.is_none()
    }

    /// Split the legacy record into per-assignment documents.
    ///
    /// A legacy `assignments` map takes precedence; a lone `progress` field
    /// belongs to `default_assignment`.
    #[must_use]
    pub fn into_documents(
        self,
        default_assignment: &AssignmentId,
    ) -> BTreeMap<AssignmentId, AssignmentProgress> {
        match (self.assignments, self.progress) {
            (Some(assignments), _) => assignments,
            (None, Some(progress)) => {
                let mut docs = BTreeMap::new();
                docs.insert(default_assignment.clone(), progress);
                docs
            }
            (None, None) => BTreeMap::new(),
        }
    }
}

//
// ─── CONTRACTS ────────────────────────────────────────────────────────────────
//

/// Cloud document store holding one progress document per user and assignment.
#[async_trait]
pub trait RemoteProgressStore: Send + Sync {
    /// Fetch one assignment document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
    ) -> Result<Option<AssignmentProgress>, StorageError>;

    /// Fetch every assignment document of a user as one aggregate.
    ///
    /// Returns `Ok(None)` when the user has neither a root record nor any
    /// assignment document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_all(&self, user: &UserId) -> Result<Option<QuizProgress>, StorageError>;

    /// Upsert an assignment document and raise the user's root `lastUpdated`
    /// to at least the document's stamp.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn put(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
        progress: &AssignmentProgress,
    ) -> Result<(), StorageError>;

    /// Raise the user's root `lastUpdated` to at least `last_updated`,
    /// creating the root record if needed. Documents are left alone.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn touch_root(&self, user: &UserId, last_updated: i64) -> Result<(), StorageError>;

    /// Read legacy progress fields from the user root record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn legacy_root(&self, user: &UserId) -> Result<Option<LegacyRoot>, StorageError>;
}

/// Device-scoped synchronous cache of a user's aggregate progress.
pub trait LocalMirror: Send + Sync {
    /// Read the cached aggregate.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for a corrupt entry, or
    /// `StorageError::Io` if the backing medium fails.
    fn get(&self, user: &UserId) -> Result<Option<QuizProgress>, StorageError>;

    /// Replace the cached aggregate.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be written.
    fn put(&self, user: &UserId, progress: &QuizProgress) -> Result<(), StorageError>;

    /// Erase the cached aggregate. Missing entries are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry exists but cannot be removed.
    fn delete(&self, user: &UserId) -> Result<(), StorageError>;
}

/// Read-only lookup of assignment descriptors and question content.
#[async_trait]
pub trait AssignmentCatalog: Send + Sync {
    /// List all assignment descriptors in catalog order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_assignments(&self) -> Result<Vec<Assignment>, StorageError>;

    /// Fetch one descriptor by unique name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no such assignment exists.
    async fn get_assignment(&self, id: &AssignmentId) -> Result<Assignment, StorageError> {
        self.list_assignments()
            .await?
            .into_iter()
            .find(|a| a.id() == id)
            .ok_or(StorageError::NotFound)
    }

    /// Load the questions of an assignment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question file is missing.
    async fn load_questions(&self, id: &AssignmentId) -> Result<Vec<Question>, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATIONS ────────────────────────────────────────────────
//

#[derive(Debug, Default)]
struct RemoteUser {
    root_last_updated: Option<i64>,
    legacy: Option<LegacyRoot>,
    documents: BTreeMap<AssignmentId, AssignmentProgress>,
}

impl RemoteUser {
    fn raise_root(&mut self, stamp: i64) {
        self.root_last_updated = Some(self.root_last_updated.map_or(stamp, |r| r.max(stamp)));
    }
}

/// In-memory remote store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    users: Arc<Mutex<HashMap<UserId, RemoteUser>>>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed legacy root fields, as an older client would have left them.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the store lock is poisoned.
    pub fn set_legacy_root(
        &self,
        user: &UserId,
        legacy: LegacyRoot,
        last_updated: Option<i64>,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let entry = guard.entry(user.clone()).or_default();
        entry.legacy = Some(legacy);
        entry.root_last_updated = last_updated;
        Ok(())
    }
}

#[async_trait]
impl RemoteProgressStore for InMemoryRemoteStore {
    async fn get(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
    ) -> Result<Option<AssignmentProgress>, StorageError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(user)
            .and_then(|u| u.documents.get(assignment))
            .cloned())
    }

    async fn get_all(&self, user: &UserId) -> Result<Option<QuizProgress>, StorageError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let Some(entry) = guard.get(user) else {
            return Ok(None);
        };
        Ok(Some(QuizProgress::from_parts(
            entry.documents.clone(),
            entry.root_last_updated.unwrap_or(0),
        )))
    }

    async fn put(
        &self,
        user: &UserId,
        assignment: &AssignmentId,
        progress: &AssignmentProgress,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let entry = guard.entry(user.clone()).or_default();
        entry
            .documents
            .insert(assignment.clone(), progress.clone());
        entry.raise_root(progress.last_updated());
        Ok(())
    }

    async fn touch_root(&self, user: &UserId, last_updated: i64) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.entry(user.clone()).or_default().raise_root(last_updated);
        Ok(())
    }

    async fn legacy_root(&self, user: &UserId) -> Result<Option<LegacyRoot>, StorageError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user).and_then(|u| u.legacy.clone()))
    }
}

/// In-memory local mirror holding serialized entries, like browser storage.
#[derive(Clone, Default)]
pub struct InMemoryMirror {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryMirror {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw entry without validation.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert_raw(&self, user: &UserId, raw: impl Into<String>) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(mirror_key(user), raw.into());
        Ok(())
    }

    /// Whether an entry exists for the user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn contains(&self, user: &UserId) -> Result<bool, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.contains_key(&mirror_key(user)))
    }
}

impl LocalMirror for InMemoryMirror {
    fn get(&self, user: &UserId) -> Result<Option<QuizProgress>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&mirror_key(user))
            .map(|raw| {
                serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    fn put(&self, user: &UserId, progress: &QuizProgress) -> Result<(), StorageError> {
        let raw = serde_json::to_string(progress)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(mirror_key(user), raw);
        Ok(())
    }

    fn delete(&self, user: &UserId) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(&mirror_key(user));
        Ok(())
    }
}

/// In-memory catalog for tests.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    assignments: Arc<Mutex<Vec<(Assignment, Vec<Question>)>>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assignment and its questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn insert(&self, assignment: Assignment, questions: Vec<Question>) -> Result<(), StorageError> {
        let mut guard = self
            .assignments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.retain(|(a, _)| a.id() != assignment.id());
        guard.push((assignment, questions));
        Ok(())
    }
}

#[async_trait]
impl AssignmentCatalog for InMemoryCatalog {
    async fn list_assignments(&self) -> Result<Vec<Assignment>, StorageError> {
        let guard = self
            .assignments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.iter().map(|(a, _)| a.clone()).collect())
    }

    async fn load_questions(&self, id: &AssignmentId) -> Result<Vec<Question>, StorageError> {
        let guard = self
            .assignments
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .iter()
            .find(|(a, _)| a.id() == id)
            .map(|(_, qs)| qs.clone())
            .ok_or(StorageError::NotFound)
    }
}

/// Aggregates the collaborators behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub remote: Arc<dyn RemoteProgressStore>,
    pub mirror: Arc<dyn LocalMirror>,
    pub catalog: Arc<dyn AssignmentCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            remote: Arc::new(InMemoryRemoteStore::new()),
            mirror: Arc::new(InMemoryMirror::new()),
            catalog: Arc::new(InMemoryCatalog::new()),
        }
    }
}
