use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::ids::{AssignmentId, QuestionNo};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssignmentError {
    #[error("assignment display name cannot be empty")]
    EmptyName,

    #[error("assignment must have at least one question")]
    NoQuestions,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionNo),

    #[error("question {0} has no options")]
    NoOptions(QuestionNo),

    #[error("question {0} answer is not one of its options")]
    AnswerNotAnOption(QuestionNo),
}

//
// ─── ASSIGNMENT ────────────────────────────────────────────────────────────────
//

/// Catalog descriptor of an assignment.
///
/// Field names follow the catalog file (`asgn-unique-name`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(rename = "asgn-unique-name")]
    id: AssignmentId,
    #[serde(rename = "asgn-display-name")]
    display_name: String,
    num_of_questions: u32,
    #[serde(default)]
    has_pg_ref: bool,
    #[serde(default)]
    has_hints: bool,
    #[serde(default)]
    has_solutions: bool,
}

impl Assignment {
    /// Creates a descriptor with no optional question features.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentError::EmptyName` or `AssignmentError::NoQuestions`.
    pub fn new(
        id: AssignmentId,
        display_name: impl Into<String>,
        num_of_questions: u32,
    ) -> Result<Self, AssignmentError> {
        let assignment = Self {
            id,
            display_name: display_name.into(),
            num_of_questions,
            has_pg_ref: false,
            has_hints: false,
            has_solutions: false,
        };
        assignment.validate()?;
        Ok(assignment)
    }

    /// Check a descriptor read from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `AssignmentError::EmptyName` or `AssignmentError::NoQuestions`.
    pub fn validate(&self) -> Result<(), AssignmentError> {
        if self.display_name.trim().is_empty() {
            return Err(AssignmentError::EmptyName);
        }
        if self.num_of_questions == 0 {
            return Err(AssignmentError::NoQuestions);
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &AssignmentId {
        &self.id
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn num_of_questions(&self) -> u32 {
        self.num_of_questions
    }

    #[must_use]
    pub fn has_pg_ref(&self) -> bool {
        self.has_pg_ref
    }

    #[must_use]
    pub fn has_hints(&self) -> bool {
        self.has_hints
    }

    #[must_use]
    pub fn has_solutions(&self) -> bool {
        self.has_solutions
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// A multiple-choice question as stored in `assignments/<name>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub qno: QuestionNo,
    pub question_text: String,
    pub options: Vec<String>,
    pub answer: String,
    #[serde(default)]
    pub hint: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub page_ref: u32,
}

impl Question {
    #[must_use]
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    #[must_use]
    pub fn is_correct(&self, option: &str) -> bool {
        self.answer == option
    }
}

/// Validate a loaded question list.
///
/// The descriptor's `num_of_questions` is advisory; callers compare it with
/// `questions.len()` themselves.
///
/// # Errors
///
/// Returns the first `AssignmentError` found.
pub fn validate_questions(questions: &[Question]) -> Result<(), AssignmentError> {
    if questions.is_empty() {
        return Err(AssignmentError::NoQuestions);
    }

    let mut seen = BTreeSet::new();
    for q in questions {
        if !seen.insert(q.qno) {
            return Err(AssignmentError::DuplicateQuestion(q.qno));
        }
        if q.options.is_empty() {
            return Err(AssignmentError::NoOptions(q.qno));
        }
        if !q.has_option(&q.answer) {
            return Err(AssignmentError::AnswerNotAnOption(q.qno));
        }
    }
    Ok(())
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
