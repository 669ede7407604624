use std::sync::Arc;

use chrono::{DateTime, Utc};
use quiz_core::model::{Assignment, AssignmentId, Question, QuizProgress, validate_questions};
use storage::repository::AssignmentCatalog;
use tracing::warn;

use crate::error::CatalogServiceError;

/// One row of the assignment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentOverview {
    pub assignment: Assignment,
    pub answered: usize,
    /// At least one answer and every question answered.
    pub completed: bool,
    pub last_active: Option<DateTime<Utc>>,
}

/// Reads assignment descriptors and question sets.
#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn AssignmentCatalog>,
}

impl CatalogService {
    #[must_use]
    pub fn new(catalog: Arc<dyn AssignmentCatalog>) -> Self {
        Self { catalog }
    }

    /// List assignments joined with the user's progress.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if the catalog cannot be read.
    pub async fn overview(
        &self,
        progress: &QuizProgress,
    ) -> Result<Vec<AssignmentOverview>, CatalogServiceError> {
        let assignments = self.catalog.list_assignments().await?;
        Ok(assignments
            .into_iter()
            .map(|assignment| {
                let doc = progress.assignment(assignment.id());
                let answered = doc.map_or(0, |p| p.answered_count());
                let total = usize::try_from(assignment.num_of_questions()).unwrap_or(usize::MAX);
                let last_active = doc
                    .map(|p| p.last_updated())
                    .filter(|stamp| *stamp > 0)
                    .and_then(DateTime::<Utc>::from_timestamp_millis);
                AssignmentOverview {
                    completed: answered > 0 && answered >= total,
                    answered,
                    last_active,
                    assignment,
                }
            })
            .collect())
    }

    /// Load an assignment with its validated questions.
    ///
    /// A question file whose length differs from the descriptor's
    /// `num_of_questions` is still loaded; the mismatch is logged.
    ///
    /// # Errors
    ///
    /// Returns `CatalogServiceError::Storage` if the assignment is unknown or
    /// unreadable, `CatalogServiceError::Assignment` if a question is
    /// malformed.
    pub async fn load(
        &self,
        id: &AssignmentId,
    ) -> Result<(Assignment, Vec<Question>), CatalogServiceError> {
        let assignment = self.catalog.get_assignment(id).await?;
        let questions = self.catalog.load_questions(id).await?;
        validate_questions(&questions)?;
        let declared = assignment.num_of_questions();
        if usize::try_from(declared).ok() != Some(questions.len()) {
            warn!(
                assignment = %id,
                declared,
                loaded = questions.len(),
                "question count differs from catalog descriptor"
            );
        }
        Ok((assignment, questions))
    }
}
