use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::ids::{AssignmentId, QuestionNo};
use crate::model::mark::MarkColor;

//
// ─── ASSIGNMENT PROGRESS ───────────────────────────────────────────────────────
//

/// Answers, notes and marks of one user on one assignment.
///
/// This is also the remote document shape:
/// `{ answers, notes, marks, completed, lastUpdated }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentProgress {
    #[serde(default)]
    answers: BTreeMap<QuestionNo, String>,
    #[serde(default)]
    notes: BTreeMap<QuestionNo, String>,
    #[serde(default)]
    marks: BTreeMap<QuestionNo, MarkColor>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    last_updated: i64,
}

impl AssignmentProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_last_updated(mut self, stamp: i64) -> Self {
        self.last_updated = stamp;
        self
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionNo, String> {
        &self.answers
    }

    #[must_use]
    pub fn notes(&self) -> &BTreeMap<QuestionNo, String> {
        &self.notes
    }

    #[must_use]
    pub fn marks(&self) -> &BTreeMap<QuestionNo, MarkColor> {
        &self.marks
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Epoch milliseconds of the mutation that produced this snapshot.
    #[must_use]
    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    #[must_use]
    pub fn answer(&self, qno: QuestionNo) -> Option<&str> {
        self.answers.get(&qno).map(String::as_str)
    }

    #[must_use]
    pub fn note(&self, qno: QuestionNo) -> Option<&str> {
        self.notes.get(&qno).map(String::as_str)
    }

    #[must_use]
    pub fn mark(&self, qno: QuestionNo) -> Option<MarkColor> {
        self.marks.get(&qno).copied()
    }

    #[must_use]
    pub fn is_answered(&self, qno: QuestionNo) -> bool {
        self.answers.contains_key(&qno)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty() && self.notes.is_empty() && self.marks.is_empty()
    }

    /// Record an answer unless the question already has one.
    ///
    /// Returns `true` if the answer was recorded.
    pub fn record_answer(&mut self, qno: QuestionNo, option: impl Into<String>) -> bool {
        if self.answers.contains_key(&qno) {
            return false;
        }
        self.answers.insert(qno, option.into());
        true
    }

    /// Replace the note for a question. An empty note removes the entry.
    pub fn set_note(&mut self, qno: QuestionNo, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.notes.remove(&qno);
        } else {
            self.notes.insert(qno, text);
        }
    }

    /// Set or clear the bookmark color for a question.
    pub fn set_mark(&mut self, qno: QuestionNo, color: Option<MarkColor>) {
        match color {
            Some(color) => {
                self.marks.insert(qno, color);
            }
            None => {
                self.marks.remove(&qno);
            }
        }
    }

    /// Apply `color`, or clear the mark if it is already that color.
    ///
    /// Returns the mark now in effect.
    pub fn toggle_mark(&mut self, qno: QuestionNo, color: MarkColor) -> Option<MarkColor> {
        let next = if self.mark(qno) == Some(color) {
            None
        } else {
            Some(color)
        };
        self.set_mark(qno, next);
        next
    }

    /// Remove the answer for one question, leaving its note and mark alone.
    ///
    /// Returns `true` if an answer was removed.
    pub fn clear_answer(&mut self, qno: QuestionNo) -> bool {
        self.answers.remove(&qno).is_some()
    }

    /// Drop all answers, notes and marks.
    pub fn clear_all(&mut self) {
        self.answers.clear();
        self.notes.clear();
        self.marks.clear();
        self.completed = false;
    }

    /// Recompute `completed` against the assignment's question count.
    pub fn refresh_completed(&mut self, total_questions: u32) {
        let total = usize::try_from(total_questions).unwrap_or(usize::MAX);
        self.completed = self.answers.len() >= total;
    }
}

//
// ─── AGGREGATE PROGRESS ────────────────────────────────────────────────────────
//

/// Progress across all assignments for one user.
///
/// `last_updated` is never lower than any contained assignment's stamp; both
/// are raised together by [`QuizProgress::record`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizProgress {
    #[serde(default)]
    assignments: BTreeMap<AssignmentId, AssignmentProgress>,
    #[serde(default)]
    last_updated: i64,
}

impl QuizProgress {
    /// An aggregate with no assignments, stamped at `now_ms`.
    #[must_use]
    pub fn empty(now_ms: i64) -> Self {
        Self {
            assignments: BTreeMap::new(),
            last_updated: now_ms,
        }
    }

    /// Rebuild an aggregate from stored parts.
    ///
    /// The stamp is raised to the newest contained assignment if needed.
    #[must_use]
    pub fn from_parts(
        assignments: BTreeMap<AssignmentId, AssignmentProgress>,
        last_updated: i64,
    ) -> Self {
        let newest = assignments
            .values()
            .map(AssignmentProgress::last_updated)
            .max()
            .unwrap_or(i64::MIN);
        Self {
            assignments,
            last_updated: last_updated.max(newest),
        }
    }

    #[must_use]
    pub fn assignments(&self) -> &BTreeMap<AssignmentId, AssignmentProgress> {
        &self.assignments
    }

    #[must_use]
    pub fn assignment(&self, id: &AssignmentId) -> Option<&AssignmentProgress> {
        self.assignments.get(id)
    }

    #[must_use]
    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Strict last-write-wins comparison. Equal stamps are not newer.
    #[must_use]
    pub fn is_newer_than(&self, other: &QuizProgress) -> bool {
        self.last_updated > other.last_updated
    }

    /// The stamp the next mutation receives: the clock reading, but never
    /// below the current aggregate stamp.
    #[must_use]
    pub fn next_stamp(&self, now_ms: i64) -> i64 {
        now_ms.max(self.last_updated)
    }

    /// Stamp `progress`, store it under `id` and raise the aggregate stamp.
    pub fn record(
        &mut self,
        id: AssignmentId,
        mut progress: AssignmentProgress,
        now_ms: i64,
    ) -> &AssignmentProgress {
        let stamp = self.next_stamp(now_ms);
        progress.last_updated = stamp;
        self.last_updated = stamp;
        self.assignments.insert(id.clone(), progress);
        &self.assignments[&id]
    }
}
