use crate::connection::backend::{ConnectionError, ResolutionError};
use crate::identifiers::FormatError;
use crate::wire::{Envelope, FailureCause, Payload};
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("Backend failed the request: {0}")]
    Failure(FailureCause),
    // Retryable.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("Malformed response: {0}")]
    Format(#[from] FormatError),
    #[error("Client halted: {0}")]
    Halted(String),
    // Retryable. The backend may still apply the request.
    #[error("Timed out waiting for the backend")]
    Timeout,
}

pub(crate) type ResponseCallback = oneshot::Sender<Result<Payload, RequestError>>;

/// A request accepted by a connection and not yet answered.
#[derive(Debug)]
pub(crate) struct QueuedRequest {
    pub envelope: Envelope,
    callback: ResponseCallback,
    // Handed to the current incarnation's transmitter.
    pub transmitted: bool,
}

impl QueuedRequest {
    pub(crate) fn new(envelope: Envelope, callback: ResponseCallback) -> Self {
        QueuedRequest {
            envelope,
            callback,
            transmitted: false,
        }
    }

    pub(crate) fn complete(self, result: Result<Payload, RequestError>) {
        // The caller may have given up waiting, that's fine.
        let _ = self.callback.send(result);
    }

    pub(crate) fn matches(&self, response: &Envelope) -> bool {
        self.envelope.target() == response.target() && self.envelope.sequence() == response.sequence()
    }
}
