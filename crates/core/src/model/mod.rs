mod assignment;
mod ids;
mod mark;
mod note;
mod progress;
mod stats;

pub use assignment::{Assignment, AssignmentError, Question, validate_questions};
pub use ids::{AssignmentId, ParseIdError, QuestionNo, UserId};
pub use mark::{MarkColor, MarkColorError};
pub use note::NoteDraft;
pub use progress::{AssignmentProgress, QuizProgress};
pub use stats::ProgressStats;
