use thiserror::Error;

#[derive(Debug, Error)]
pub enum InterchangeError {
    #[error("Unsupported document version: {0}")]
    UnsupportedVersion(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Malformed document: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Store error: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl InterchangeError {
    /// True for errors raised while checking a document, before anything was
    /// written to the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            InterchangeError::UnsupportedVersion(_)
                | InterchangeError::InvalidDocument(_)
                | InterchangeError::MalformedJson(_)
        )
    }
}

pub type InterchangeResult<T> = Result<T, InterchangeError>;
