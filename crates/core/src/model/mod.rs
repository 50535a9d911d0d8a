pub mod answer;
pub mod exposure;
mod ids;
pub mod item;
pub mod score;

pub use ids::{ItemId, ParseIdError, SessionId, UserId};

pub use answer::{AnswerError, AnswerStatus, PendingAnswer};
pub use exposure::{AnswerOutcome, ExposureError, ExposureRecord};
pub use item::{Difficulty, Item, ItemContent, ItemContentError, ItemError};
pub use score::{ScoreError, SessionResult, SessionScore};
