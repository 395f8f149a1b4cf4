use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for LeaseError {
    fn from(err: tokio::task::JoinError) -> Self {
        LeaseError::Internal(format!("lease worker failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, LeaseError>;
