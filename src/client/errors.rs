use crate::connection::{ConnectionError, RequestError, ResolutionError};
use crate::history::HistoryError;
use crate::identifiers::{ClientIdentifier, FormatError};
use crate::wire::{FailureCause, PayloadKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    // Illegal state, not retried.
    #[error("Client {0:?} is closed")]
    Closed(ClientIdentifier),

    // Illegal state, not retried.
    #[error(transparent)]
    History(#[from] HistoryError),

    // Illegal state, not retried.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    // A write/merge/delete failed. Reported when the transaction is readied.
    #[error("Transaction operation failed: {0}")]
    Operation(String),

    // Can be retried. Usually the shard is in the middle of electing a leader.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    // Can be retried.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Backend failed the request: {0}")]
    Backend(FailureCause),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("Malformed response: {0}")]
    Format(#[from] FormatError),

    #[error("Unexpected response {0:?}")]
    UnexpectedResponse(PayloadKind),

    #[error("Client halted: {0}")]
    Halted(String),

    // Client logic runs on a background task. This error is returned if the task has exited.
    #[error("Client task has exited")]
    ClientExited,
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Resolution(_) | ClientError::Timeout(_))
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            ClientError::Closed(_) | ClientError::History(_) | ClientError::IllegalState(_)
        )
    }
}

// ------- Conversions --------

impl From<RequestError> for ClientError {
    fn from(error: RequestError) -> Self {
        match error {
            RequestError::Failure(FailureCause::Operation(message)) => ClientError::Operation(message),
            RequestError::Failure(FailureCause::IllegalState(message)) => ClientError::IllegalState(message),
            RequestError::Failure(cause) => ClientError::Backend(cause),
            RequestError::Resolution(e) => ClientError::Resolution(e),
            RequestError::Connection(e) => ClientError::Connection(e),
            RequestError::Format(e) => ClientError::Format(e),
            RequestError::Halted(cause) => ClientError::Halted(cause),
            RequestError::Timeout => ClientError::Timeout("backend response"),
        }
    }
}
