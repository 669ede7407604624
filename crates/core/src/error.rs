use thiserror::Error;

use crate::model::{AssignmentError, MarkColorError, ParseIdError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Id(#[from] ParseIdError),
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error(transparent)]
    MarkColor(#[from] MarkColorError),
}
