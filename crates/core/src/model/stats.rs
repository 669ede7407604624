use crate::model::assignment::Question;
use crate::model::progress::AssignmentProgress;

/// Answer tally for one assignment, as shown next to the question list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressStats {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
}

impl ProgressStats {
    /// Count correct and incorrect answers against the question list.
    ///
    /// Answers for question numbers missing from `questions` are ignored.
    #[must_use]
    pub fn compute(questions: &[Question], progress: &AssignmentProgress) -> Self {
        let mut stats = Self {
            total: questions.len(),
            ..Self::default()
        };
        for (qno, selected) in progress.answers() {
            let Some(question) = questions.iter().find(|q| q.qno == *qno) else {
                continue;
            };
            if question.is_correct(selected) {
                stats.correct += 1;
            } else {
                stats.incorrect += 1;
            }
        }
        stats
    }

    #[must_use]
    pub fn answered(&self) -> usize {
        self.correct + self.incorrect
    }

    /// Share of questions answered, rounded to a whole percent.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        rounded_percent(self.answered(), self.total)
    }

    /// Share of answered questions that were correct, rounded to a whole percent.
    #[must_use]
    pub fn accuracy(&self) -> u8 {
        rounded_percent(self.correct, self.answered())
    }
}

fn rounded_percent(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let pct = (part.saturating_mul(200) + whole) / whole.saturating_mul(2);
    u8::try_from(pct.min(100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::QuestionNo;

    fn q(n: u32, answer: &str) -> Question {
        Question {
            qno: QuestionNo::new(n),
            question_text: String::new(),
            options: vec!["A".into(), "B".into(), "C".into()],
            answer: answer.into(),
            hint: String::new(),
            solution: String::new(),
            page_ref: 0,
        }
    }

    #[test]
    fn tallies_correct_and_incorrect() {
        let questions = vec![q(1, "A"), q(2, "B"), q(3, "C")];
        let mut progress = AssignmentProgress::new();
        progress.record_answer(QuestionNo::new(1), "A");
        progress.record_answer(QuestionNo::new(2), "C");
        progress.record_answer(QuestionNo::new(99), "A");

        let stats = ProgressStats::compute(&questions, &progress);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.incorrect, 1);
        assert_eq!(stats.percent_complete(), 67);
        assert_eq!(stats.accuracy(), 50);
    }

    #[test]
    fn empty_assignment_reports_zero() {
        let stats = ProgressStats::default();
        assert_eq!(stats.percent_complete(), 0);
        assert_eq!(stats.accuracy(), 0);
    }
}
