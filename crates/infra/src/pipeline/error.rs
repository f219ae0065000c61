use thiserror::Error;

use crate::command_dispatcher::DispatchError;
use crate::commands::DecodeError;
use crate::repository::RepositoryError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing, malformed, expired or forged credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// No policy accepted the principal, or the principal is unknown. Callers
    /// cannot tell the two apart.
    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid command: {0}")]
    Validation(String),

    #[error("call cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<DecodeError> for PipelineError {
    fn from(value: DecodeError) -> Self {
        PipelineError::Validation(value.to_string())
    }
}

impl From<PipelineError> for tonic::Status {
    fn from(value: PipelineError) -> Self {
        let message = value.to_string();
        match value {
            PipelineError::Unauthenticated(_) => tonic::Status::unauthenticated(message),
            PipelineError::Unauthorized => tonic::Status::permission_denied(message),
            PipelineError::Validation(_) => tonic::Status::invalid_argument(message),
            PipelineError::Cancelled => tonic::Status::cancelled(message),
            PipelineError::DeadlineExceeded => tonic::Status::deadline_exceeded(message),
            PipelineError::Repository(RepositoryError::UserNotFound) => {
                tonic::Status::permission_denied("unauthorized")
            }
            PipelineError::Repository(RepositoryError::Unavailable(_)) => {
                tonic::Status::unavailable(message)
            }
            PipelineError::Dispatch(err) => match err {
                DispatchError::Concurrency(_) => tonic::Status::aborted(message),
                DispatchError::Validation(_) => tonic::Status::invalid_argument(message),
                DispatchError::InvariantViolation(_) => {
                    tonic::Status::failed_precondition(message)
                }
                DispatchError::Unauthorized => tonic::Status::permission_denied(message),
                DispatchError::NotFound => tonic::Status::not_found(message),
                DispatchError::Deserialize(_)
                | DispatchError::CorruptStream(_)
                | DispatchError::Store(_) => tonic::Status::internal(message),
            },
        }
    }
}
