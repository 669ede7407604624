use std::path::Path;
use std::sync::Arc;

use quiz_core::model::{AssignmentId, UserId};
use storage::repository::Storage;
use storage::{FileCatalog, FileMirror};
use tracing::info;

use crate::Clock;
use crate::catalog_service::CatalogService;
use crate::error::{AppServicesError, SessionError};
use crate::quiz_session::{AssignmentSession, QuizSession};
use crate::reconcile::ReconciliationEngine;
use crate::sync::{SyncCoordinator, SyncSettings};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    settings: SyncSettings,
    storage: Storage,
    reconciler: Arc<ReconciliationEngine>,
    catalog: Arc<CatalogService>,
}

impl AppServices {
    /// Build services over a `SQLite` remote store, a file mirror and a file
    /// catalog.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        mirror_dir: &Path,
        catalog_dir: &Path,
        clock: Clock,
        settings: SyncSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(
            db_url,
            Arc::new(FileMirror::new(mirror_dir)),
            Arc::new(FileCatalog::new(catalog_dir)),
        )
        .await?;
        Self::from_storage(storage, clock, settings)
    }

    /// Build services over already constructed storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Id` if the built-in legacy assignment id
    /// is rejected.
    pub fn from_storage(
        storage: Storage,
        clock: Clock,
        settings: SyncSettings,
    ) -> Result<Self, AppServicesError> {
        let reconciler = Arc::new(ReconciliationEngine::new(
            clock,
            Arc::clone(&storage.remote),
            Arc::clone(&storage.mirror),
        )?);
        let catalog = Arc::new(CatalogService::new(Arc::clone(&storage.catalog)));
        Ok(Self {
            clock,
            settings,
            storage,
            reconciler,
            catalog,
        })
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn reconciler(&self) -> Arc<ReconciliationEngine> {
        Arc::clone(&self.reconciler)
    }

    #[must_use]
    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Reconcile the user's progress and start a session over it.
    pub async fn login(&self, user: UserId) -> QuizSession {
        let reconciliation = self.reconciler.reconcile(&user).await;
        let report = reconciliation.report;
        info!(
            user = %user,
            winner = ?report.winner,
            assignments = reconciliation.progress.assignments().len(),
            "logged in"
        );
        let sync = SyncCoordinator::new(
            self.clock,
            self.settings,
            user,
            reconciliation.progress,
            Arc::clone(&self.storage.remote),
            Arc::clone(&self.storage.mirror),
        );
        QuizSession::new(sync, report)
    }

    /// Load an assignment from the catalog and open it in `session`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Catalog` if the assignment cannot be loaded.
    pub async fn open_assignment<'s>(
        &self,
        session: &'s mut QuizSession,
        id: &AssignmentId,
    ) -> Result<AssignmentSession<'s>, SessionError> {
        let (assignment, questions) = self.catalog.load(id).await?;
        session.open(assignment, questions)
    }
}
