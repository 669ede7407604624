//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AssignmentError, ParseIdError, QuestionNo};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by assignment session operations.
///
/// Sync failures never appear here: remote and mirror errors are logged and
/// reflected only in the sync status.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("question {0} is not part of this assignment")]
    UnknownQuestion(QuestionNo),
    #[error("\"{option}\" is not an option of question {qno}")]
    UnknownOption { qno: QuestionNo, option: String },
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Catalog(#[from] CatalogServiceError),
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogServiceError {
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Catalog(#[from] CatalogServiceError),
}
