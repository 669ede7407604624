use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use quiz_core::model::{Assignment, AssignmentId, Question};
use tracing::debug;

use crate::repository::{AssignmentCatalog, StorageError};

/// Name of the descriptor list inside a catalog directory.
pub const CATALOG_INDEX_FILE: &str = "assignments.json";

/// Catalog read from static files:
///
/// ```text
/// <root>/assignments.json            descriptor list
/// <root>/assignments/<name>.json     questions of one assignment
/// ```
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
}

impl FileCatalog {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn questions_path(&self, id: &AssignmentId) -> PathBuf {
        self.root.join("assignments").join(format!("{id}.json"))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StorageError::NotFound),
        Err(e) => return Err(StorageError::Io(e.to_string())),
    };
    serde_json::from_slice(&raw)
        .map_err(|e| StorageError::Serialization(format!("{}: {e}", path.display())))
}

#[async_trait]
impl AssignmentCatalog for FileCatalog {
    async fn list_assignments(&self) -> Result<Vec<Assignment>, StorageError> {
        let assignments: Vec<Assignment> = read_json(&self.root.join(CATALOG_INDEX_FILE)).await?;
        for a in &assignments {
            a.validate()
                .map_err(|e| StorageError::Serialization(format!("{}: {e}", a.id())))?;
        }
        debug!(count = assignments.len(), "catalog loaded");
        Ok(assignments)
    }

    async fn load_questions(&self, id: &AssignmentId) -> Result<Vec<Question>, StorageError> {
        read_json(&self.questions_path(id)).await
    }
}
