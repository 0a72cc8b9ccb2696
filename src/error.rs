use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Dataset store unavailable: {0}")]
    DatasetUnavailable(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::error::PolarsError> for InsightError {
    fn from(err: polars::error::PolarsError) -> Self {
        InsightError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;
