use crate::profile::LocateError;
use crate::semantic::SemanticSearchError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Locate(#[from] LocateError),

    #[error("{0}")]
    Search(#[from] SemanticSearchError),

    #[error("session not found")]
    SessionNotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("io error: {0:?}")]
    IO(#[from] std::io::Error),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Failures to get the index ready at all, as opposed to a bad request.
    pub fn is_initialization(&self) -> bool {
        use crate::semantic::embeddings::EmbeddingError;

        match self {
            AppError::Locate(_) => true,
            AppError::Search(SemanticSearchError::Source(_)) => true,
            AppError::Search(SemanticSearchError::Embedding(
                EmbeddingError::InitFailed(_) | EmbeddingError::InvalidModel(_),
            )) => true,
            _ => false,
        }
    }
}
