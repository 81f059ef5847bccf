use crate::connection::backend::{ConnectionError, ShardKey, TransportError};
use crate::connection::request::{QueuedRequest, RequestError, ResponseCallback};
use crate::history::TransactionExecutor;
use crate::identifiers::FormatError;
use crate::wire::{ABIVersion, Envelope, FailureCause, Payload, Target};
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// A resolved backend, ready to carry requests.
pub(crate) struct ConnectedBackend {
    pub name: String,
    pub version: ABIVersion,
    pub max_messages: u32,
    pub transmitter: mpsc::UnboundedSender<Bytes>,
    // Present when the backend is co-located with us.
    pub local: Option<TransactionExecutor>,
}

enum ConnectionState {
    Connecting,
    Connected(ConnectedBackend),
    Closed,
}

pub(crate) enum ResponseOutcome {
    Handled,
    // The backend is gone or no longer leads the shard.
    Reconnect,
}

/// One incarnation of a client's channel to a shard's backend. Owns every request sent to the
/// shard until it is answered. A backend change never mutates an incarnation, `reconnect()`
/// consumes it and moves the outstanding requests, in send order, to a new one.
pub struct Connection {
    logger: slog::Logger,
    shard: ShardKey,
    incarnation: u64,
    state: ConnectionState,
    queue: VecDeque<QueuedRequest>,
}

impl Connection {
    pub(crate) fn connecting(logger: &slog::Logger, shard: ShardKey, incarnation: u64) -> Self {
        Connection {
            logger: logger.new(slog::o!("Shard" => format!("{:?}", shard), "Incarnation" => incarnation)),
            shard,
            incarnation,
            state: ConnectionState::Connecting,
            queue: VecDeque::new(),
        }
    }

    pub fn shard(&self) -> ShardKey {
        self.shard
    }

    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed)
    }

    pub fn backend_name(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Connected(backend) => Some(&backend.name),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<ABIVersion> {
        match &self.state {
            ConnectionState::Connected(backend) => Some(backend.version),
            _ => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(&self.state, ConnectionState::Connected(ConnectedBackend { local: Some(_), .. }))
    }

    /// Requests accepted and not yet answered.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue `envelope` and transmit it as soon as the connection allows. A closed connection
    /// fails the callback right away.
    pub(crate) fn send(&mut self, envelope: Envelope, callback: ResponseCallback) -> Result<(), ConnectionError> {
        let request = QueuedRequest::new(envelope, callback);
        if self.is_closed() {
            request.complete(Err(ConnectionError::AlreadyClosed.into()));
            return Err(ConnectionError::AlreadyClosed);
        }

        slog::debug!(
            self.logger,
            "Queueing {:?} seq {}",
            request.envelope.target(),
            request.envelope.sequence()
        );
        self.queue.push_back(request);
        self.flush();
        Ok(())
    }

    /// Finish resolution and replay everything queued so far, in send order.
    pub(crate) fn connected(&mut self, backend: ConnectedBackend) {
        if self.is_closed() {
            return;
        }

        slog::info!(
            self.logger,
            "Connected to {} at {:?}, replaying {} requests",
            backend.name,
            backend.version,
            self.queue.len()
        );
        self.state = ConnectionState::Connected(backend);
        self.flush();
    }

    pub(crate) fn on_response(&mut self, delivery: Result<Bytes, TransportError>) -> ResponseOutcome {
        let frame = match delivery {
            Ok(frame) => frame,
            Err(e) => {
                slog::warn!(self.logger, "Transport failure: {}", e);
                return ResponseOutcome::Reconnect;
            }
        };

        match Envelope::decode(frame) {
            Ok(response) => {
                if let Payload::RequestFailure {
                    cause: FailureCause::NotLeader,
                } = response.payload()
                {
                    slog::info!(self.logger, "Backend is no longer leader");
                    return ResponseOutcome::Reconnect;
                }
                self.complete_matching(response);
            }
            Err(e) => self.fail_oldest_transmitted(e),
        }

        self.flush();
        ResponseOutcome::Handled
    }

    /// Consume this incarnation. Outstanding requests move to the new one, still in send order,
    /// with their sequence numbers.
    pub(crate) fn reconnect(self, incarnation: u64) -> Connection {
        let mut next = Connection::connecting(&self.logger, self.shard, incarnation);
        slog::info!(next.logger, "Reconnecting with {} outstanding requests", self.queue.len());

        next.queue = self.queue;
        for request in next.queue.iter_mut() {
            request.transmitted = false;
        }

        next
    }

    /// Permanently close. Outstanding requests fail with `AlreadyClosed`.
    pub(crate) fn close(&mut self) {
        if !self.is_closed() {
            slog::info!(self.logger, "Closing with {} outstanding requests", self.queue.len());
            self.fail_all(ConnectionError::AlreadyClosed.into());
            self.state = ConnectionState::Closed;
        }
    }

    pub(crate) fn fail_all(&mut self, error: RequestError) {
        for request in self.queue.drain(..) {
            request.complete(Err(error.clone()));
        }
    }

    fn complete_matching(&mut self, response: Envelope) {
        let position = self.queue.iter().position(|request| request.matches(&response));
        let request = match position.and_then(|position| self.queue.remove(position)) {
            Some(request) => request,
            None => {
                slog::warn!(
                    self.logger,
                    "Dropping unmatched response for {:?} seq {}",
                    response.target(),
                    response.sequence()
                );
                return;
            }
        };

        match response.into_payload() {
            Payload::RequestFailure { cause } => {
                if let FailureCause::OutOfOrder { .. } = cause {
                    slog::error!(
                        self.logger,
                        "Scope {:?} failed on backend: {}",
                        request.envelope.target(),
                        cause
                    );
                }
                request.complete(Err(RequestError::Failure(cause)));
            }
            payload => request.complete(Ok(payload)),
        }
    }

    // Transmission is strictly sequential, so an undecodable frame answers the oldest request on
    // the wire.
    fn fail_oldest_transmitted(&mut self, error: FormatError) {
        slog::warn!(self.logger, "Malformed response: {}", error);
        if let Some(position) = self.queue.iter().position(|request| request.transmitted) {
            if let Some(request) = self.queue.remove(position) {
                request.complete(Err(RequestError::Format(error)));
            }
        }
    }

    fn flush(&mut self) {
        let backend = match &mut self.state {
            ConnectionState::Connected(backend) => backend,
            _ => return,
        };

        if let Some(local) = backend.local.as_mut() {
            let mut remaining = VecDeque::with_capacity(self.queue.len());
            for request in self.queue.drain(..) {
                match request.envelope.target() {
                    Target::Transaction(transaction) if TransactionExecutor::handles(request.envelope.payload()) => {
                        let response = local.execute(transaction, request.envelope.payload());
                        match response {
                            Payload::RequestFailure { cause } => request.complete(Err(RequestError::Failure(cause))),
                            payload => request.complete(Ok(payload)),
                        }
                    }
                    _ => remaining.push_back(request),
                }
            }
            self.queue = remaining;
        }

        let mut in_flight = self.queue.iter().filter(|request| request.transmitted).count();
        for request in self.queue.iter_mut().filter(|request| !request.transmitted) {
            if in_flight >= backend.max_messages as usize {
                break;
            }
            let frame = request.envelope.with_version(backend.version).encode();
            if backend.transmitter.send(frame).is_err() {
                // Transmitter is gone, its failure report will trigger the reconnect.
                break;
            }
            request.transmitted = true;
            in_flight += 1;
        }
    }
}
