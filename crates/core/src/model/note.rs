use crate::model::ids::QuestionNo;

/// Uncommitted note text for one question.
///
/// Typing edits the draft only; the committed note changes when the draft is
/// saved through the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    qno: QuestionNo,
    committed: String,
    text: String,
}

impl NoteDraft {
    #[must_use]
    pub fn new(qno: QuestionNo, committed: impl Into<String>) -> Self {
        let committed = committed.into();
        Self {
            qno,
            text: committed.clone(),
            committed,
        }
    }

    #[must_use]
    pub fn qno(&self) -> QuestionNo {
        self.qno
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.text != self.committed
    }

    /// Discard edits and return to the committed text.
    pub fn revert(&mut self) {
        self.text.clone_from(&self.committed);
    }

    /// Mark the current text as committed.
    pub fn mark_saved(&mut self) {
        self.committed.clone_from(&self.text);
    }
}
