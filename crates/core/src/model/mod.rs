mod catalog;
mod ids;
mod question;
mod result;

pub use catalog::{Category, TestDetail, TestSummary};
pub use ids::{
    AnswerId, CategoryId, DeviceId, DeviceIdError, ParseIdError, QuestionId, TestId, UserId,
};
pub use question::{Answer, Question, UserAnswer};
pub use result::{
    Advice, ChartPoint, MAX_RESULT_NAME_LEN, SavedResult, SavedResultError, ScoredResult, TagScore,
};
