mod answers;
mod ids;
mod question;
mod result;
mod snapshot;
mod stats;

pub use ids::{CategoryId, ParseIdError, QuestionId, SessionId, TestId, UserId};

pub use answers::AnswerStore;
pub use question::{MIN_OPTIONS, Question, QuestionDraft, QuestionError, QuestionSet};
pub use result::{ResultError, ResultRecord, ScoreBreakdown};
pub use snapshot::BackgroundSnapshot;
pub use stats::{StatsDelta, UserStats};
