use thiserror::Error;

use crate::model::answer::AnswerError;
use crate::model::item::ItemError;
use crate::model::score::ScoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error(transparent)]
    Score(#[from] ScoreError),
}
