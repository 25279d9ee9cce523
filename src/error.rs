use crate::dataset::DatasetError;
use crate::estimation::PredictionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("state lock poisoned")]
    StateLock,
    #[error("unknown model: {0}")]
    UnknownModel(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}
