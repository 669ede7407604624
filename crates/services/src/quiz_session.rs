use quiz_core::model::{
    Assignment, AssignmentProgress, MarkColor, NoteDraft, ProgressStats, Question, QuestionNo,
    QuizProgress, UserId, validate_questions,
};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::SessionError;
use crate::reconcile::ReconcileReport;
use crate::sync::{SyncCoordinator, SyncStatus};

/// A logged-in user's progress session.
///
/// Created from a reconciliation pass; owns the sync coordinator and through
/// it the in-memory aggregate. All edits happen through
/// [`AssignmentSession`] handles borrowed from here.
pub struct QuizSession {
    sync: SyncCoordinator,
    login: ReconcileReport,
}

impl QuizSession {
    #[must_use]
    pub fn new(sync: SyncCoordinator, login: ReconcileReport) -> Self {
        Self { sync, login }
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        self.sync.user()
    }

    #[must_use]
    pub fn progress(&self) -> &QuizProgress {
        self.sync.progress()
    }

    /// How the session state was chosen at login.
    #[must_use]
    pub fn login_report(&self) -> &ReconcileReport {
        &self.login
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.sync.status()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.sync.is_syncing()
    }

    /// Issue all scheduled remote writes now.
    pub async fn flush(&self) {
        self.sync.flush().await;
    }

    /// Open an assignment for answering.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Assignment` when the question list is empty or
    /// a question is malformed.
    pub fn open(
        &mut self,
        assignment: Assignment,
        questions: Vec<Question>,
    ) -> Result<AssignmentSession<'_>, SessionError> {
        validate_questions(&questions)?;
        let progress = self
            .progress()
            .assignment(assignment.id())
            .cloned()
            .unwrap_or_default();
        debug!(
            user = %self.user(),
            assignment = %assignment.id(),
            answered = progress.answered_count(),
            "assignment opened"
        );
        Ok(AssignmentSession {
            session: self,
            assignment,
            questions,
            progress,
        })
    }

    /// End the session.
    ///
    /// Scheduled remote writes are abandoned, not flushed; the local mirror
    /// keeps the latest state. Returns the number of abandoned writes.
    pub fn logout(self) -> usize {
        let abandoned = self.sync.cancel_pending();
        info!(user = %self.user(), abandoned, "logged out");
        abandoned
    }
}

/// Editing handle for one assignment inside a [`QuizSession`].
///
/// Every successful edit is committed to the session immediately.
pub struct AssignmentSession<'s> {
    session: &'s mut QuizSession,
    assignment: Assignment,
    questions: Vec<Question>,
    progress: AssignmentProgress,
}

impl AssignmentSession<'_> {
    #[must_use]
    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, qno: QuestionNo) -> Option<&Question> {
        self.questions.iter().find(|q| q.qno == qno)
    }

    #[must_use]
    pub fn progress(&self) -> &AssignmentProgress {
        &self.progress
    }

    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        ProgressStats::compute(&self.questions, &self.progress)
    }

    #[must_use]
    pub fn answer(&self, qno: QuestionNo) -> Option<&str> {
        self.progress.answer(qno)
    }

    /// Start editing the note of a question from its committed text.
    #[must_use]
    pub fn note_draft(&self, qno: QuestionNo) -> NoteDraft {
        NoteDraft::new(qno, self.progress.note(qno).unwrap_or_default())
    }

    /// Record an answer. Only the first answer to a question counts.
    ///
    /// Returns `false` when the question was already answered; nothing is
    /// written in that case.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` for an unknown question or option.
    pub fn select_option(&mut self, qno: QuestionNo, option: &str) -> Result<bool, SessionError> {
        let question = self.require(qno)?;
        if !question.has_option(option) {
            return Err(SessionError::UnknownOption {
                qno,
                option: option.to_owned(),
            });
        }
        if !self.progress.record_answer(qno, option) {
            return Ok(false);
        }
        self.commit();
        Ok(true)
    }

    /// Replace the note of a question; empty text removes it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an unknown question.
    pub fn update_note(&mut self, qno: QuestionNo, text: &str) -> Result<(), SessionError> {
        self.require(qno)?;
        self.progress.set_note(qno, text);
        self.commit();
        Ok(())
    }

    /// Commit a note draft and mark it saved.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an unknown question.
    pub fn save_note(&mut self, draft: &mut NoteDraft) -> Result<(), SessionError> {
        self.update_note(draft.qno(), draft.text())?;
        draft.mark_saved();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an unknown question.
    pub fn set_mark(
        &mut self,
        qno: QuestionNo,
        color: Option<MarkColor>,
    ) -> Result<(), SessionError> {
        self.require(qno)?;
        self.progress.set_mark(qno, color);
        self.commit();
        Ok(())
    }

    /// Apply `color`, or clear the mark if it already has that color.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an unknown question.
    pub fn toggle_mark(
        &mut self,
        qno: QuestionNo,
        color: MarkColor,
    ) -> Result<Option<MarkColor>, SessionError> {
        self.require(qno)?;
        let now = self.progress.toggle_mark(qno, color);
        self.commit();
        Ok(now)
    }

    /// Forget the answer to one question so it can be tried again.
    ///
    /// Notes and marks are kept. Returns `false` if it was not answered.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for an unknown question.
    pub fn reset_question(&mut self, qno: QuestionNo) -> Result<bool, SessionError> {
        self.require(qno)?;
        if !self.progress.clear_answer(qno) {
            return Ok(false);
        }
        self.commit();
        Ok(true)
    }

    /// Clear every answer, note and mark of the assignment.
    ///
    /// `confirm` is asked first; a refusal changes nothing. On confirmation
    /// the local mirror entry is erased and the empty progress is synced to
    /// the remote store. Other assignments are untouched.
    pub fn reset_assignment(&mut self, confirm: impl FnOnce(&Assignment) -> bool) -> bool {
        if !confirm(&self.assignment) {
            return false;
        }
        self.progress.clear_all();
        self.progress.refresh_completed(self.question_count());
        let stamped = self
            .session
            .sync
            .record_reset(self.assignment.id().clone(), self.progress.clone());
        self.progress = stamped;
        info!(
            user = %self.session.user(),
            assignment = %self.assignment.id(),
            "assignment progress reset"
        );
        true
    }

    fn require(&self, qno: QuestionNo) -> Result<&Question, SessionError> {
        self.question(qno).ok_or(SessionError::UnknownQuestion(qno))
    }

    /// Completion is judged against the loaded questions, not the descriptor.
    fn question_count(&self) -> u32 {
        u32::try_from(self.questions.len()).unwrap_or(u32::MAX)
    }

    fn commit(&mut self) {
        self.progress.refresh_completed(self.question_count());
        let stamped = self
            .session
            .sync
            .record_mutation(self.assignment.id().clone(), self.progress.clone());
        self.progress = stamped;
    }
}
